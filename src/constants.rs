pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVICE_NAME: &str = "quizboard-server";

// TABLES
pub const TABLE_USERS: &str = "Users";
pub const TABLE_USER_AUTH: &str = "UserAuth";
pub const TABLE_ACHIEVEMENTS: &str = "UserAchievements";
pub const TABLE_QUESTIONS: &str = "QuizQuestions";

pub const LEADERBOARD_SIZE: usize = 10;

/// Stand-in for any value the store has no record of.
pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN_NAME: &str = "NA";
pub const DEFAULT_AUTH_PROVIDER: &str = "email";

pub const SUPABASE_AUTH_USER_PATH: &str = "/auth/v1/user";
pub const SUPABASE_REST_PATH: &str = "/rest/v1";

/// `(question, [a, b, c, d], correct letter)`, served when the question table is empty.
pub const FALLBACK_QUESTIONS: [(&str, [&str; 4], char); 4] = [
    (
        "What is the maximum number of bitcoin that will ever exist?",
        ["21 million", "100 million", "1 billion", "There is no limit"],
        'A',
    ),
    (
        "What is the name of the person (or group) who created Bitcoin?",
        ["Vitalik Buterin", "Satoshi Nakamoto", "Hal Finney", "Nick Szabo"],
        'B',
    ),
    (
        "What is a bitcoin wallet used for?",
        [
            "Mining new blocks",
            "Printing paper money",
            "Storing the keys that control your bitcoin",
            "Speeding up transactions",
        ],
        'C',
    ),
    (
        "Roughly how often is a new block added to the Bitcoin blockchain?",
        ["Every second", "Every hour", "Every day", "Every 10 minutes"],
        'D',
    ),
];

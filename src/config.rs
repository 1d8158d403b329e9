use std::path::PathBuf;

/// Everything the run needs from the environment and command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the webhook payload file (`GITHUB_EVENT_PATH`).
    pub event_path: Option<PathBuf>,
    /// Active event type (`GITHUB_EVENT_NAME`), e.g. "pull_request".
    pub event_name: String,
    /// Bot token used as `Authorization: Bot <token>` on outbound calls.
    pub bot_token: String,
    /// Base64-encoded identity-map JSON, from the CLI or `USER_MAPPING_B64`.
    pub mapping_b64: Option<String>,
    /// Discord REST base URL, overridable for testing.
    pub api_base: String,
}

impl Config {
    pub fn from_env(args: impl Iterator<Item = String>) -> Self {
        Self {
            event_path: std::env::var_os("GITHUB_EVENT_PATH").map(PathBuf::from),
            event_name: std::env::var("GITHUB_EVENT_NAME")
                .unwrap_or_else(|_| "unknown".to_string()),
            bot_token: std::env::var("DISCORD_BOT_TOKEN")
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
            mapping_b64: mapping_from_args(args)
                .or_else(|| std::env::var("USER_MAPPING_B64").ok())
                .filter(|s| !s.is_empty()),
            api_base: std::env::var("DISCORD_API_BASE")
                .unwrap_or_else(|_| "https://discord.com/api/v10".to_string()),
        }
    }
}

// First positional argument carries the mapping; a leading `--mapping-b64`
// flag (with or without `=`) is accepted for workflow compatibility.
fn mapping_from_args(args: impl Iterator<Item = String>) -> Option<String> {
    let mut args = args.skip(1);
    match args.next()? {
        flag if flag == "--mapping-b64" => args.next(),
        flag if flag.starts_with("--mapping-b64=") => {
            Some(flag["--mapping-b64=".len()..].to_string())
        }
        positional => Some(positional),
    }
}

/// Embed colors, keyed by what happened. Built once in `main` and passed
/// into the classifier rather than living in process-wide state.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    // No rule assigns `opened` yet; the table matches the full set the
    // workflow is configured to send.
    #[allow(dead_code)]
    pub opened: u32,
    pub merged: u32,
    pub closed: u32,
    pub info: u32,
    pub comment: u32,
    pub approved: u32,
    pub changes: u32,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            opened: 5_763_719,   // green
            merged: 10_181_046,  // purple
            closed: 15_548_997,  // red
            info: 3_447_003,     // blue
            comment: 16_776_960, // yellow
            approved: 5_763_719, // green, same as opened
            changes: 15_548_997, // red, same as closed
        }
    }
}

//! User-facing message texts.

pub const RATE_LIMIT_EXCEEDED: &str =
    "You have exceeded the request limit. Please try again later.";

pub fn request_limit_reached(ceiling: usize) -> String {
    format!(
        "Sorry, the maximum simultaneous request limit has been reached: {}. Please try again later.",
        ceiling
    )
}

pub const QUEUED: &str = "Queued! Please wait!";
pub const NO_TEXT: &str = "Text not recognized!";
pub const SEND_ERROR: &str = "Error sending result!";
pub const LONG_MESSAGE_SEND_ERROR: &str = "Sending long message error!";
pub const PROCESSING_ERROR: &str = "Error happened!";

pub const WAIT_TRANSCRIBE: &str = "Transcribing...";
pub const WAIT_DIARIZE: &str = "Diarizing...";
pub const TRANSCRIBE_ERROR: &str = "Transcribe API error!";
pub const DIARIZE_ERROR: &str = "Diarize API error!";
pub const TRANSCRIBE_NOT_CONNECTED: &str = "Transcribe API is not connected!";
pub const DIARIZE_NOT_CONNECTED: &str = "Diarize API is not connected!";

pub const FILE_REQUEST_ERROR: &str = "Error requesting file data!";
pub const FILE_EXTENSION_UNKNOWN: &str = "Unknown file extension!";
pub const FILE_WAIT_DOWNLOAD: &str = "Downloading file...";
pub const FILE_DOWNLOAD_ERROR: &str = "Error downloading the file!";

pub fn file_unsupported_format(extension: &str) -> String {
    format!("Unsupported file format: {}", extension)
}

pub fn file_size_limit(max_bytes: u64) -> String {
    format!(
        "File size exceeds the {:.1} MB limit! Please send a smaller file.",
        max_bytes as f64 / (1024.0 * 1024.0)
    )
}

pub fn file_duration_limit(max_seconds: u32) -> String {
    format!(
        "Duration exceeds the {} seconds limit! Please send a shorter version!",
        max_seconds
    )
}

pub fn invalid_reply(command_transcribe: &str, command_diarize: &str) -> String {
    format!(
        "Please reply to a voice, audio, video message with /{} or /{}",
        command_transcribe, command_diarize
    )
}

pub const INVALID_DIRECT: &str =
    "Send a voice, audio, video message or reply to it using commands! (see /help).";

// Admin commands
pub const LOGS_NOT_SAVING: &str = "Logs are not saving in file. Set log_file in the config!";
pub const LOGS_SEND_ERROR: &str = "Can't send logs!";
pub const LOGS_INVALID_FORMAT: &str = "Please provide N with the command in the format /logs N";
pub const LOGS_INVALID_N: &str = "Invalid N in the format /logs N. Must be int! 1 <= N <= 100";
pub const LOGS_INVALID_N_VALUE: &str = "Invalid N! 1 <= N <= 100";
pub const LOGS_GET_ERROR: &str = "Can't get logs";

pub const FILE_INVALID_FORMAT: &str =
    "Please provide a file_id with the command in the format /file file_id";
pub const FILE_SEND_ERROR: &str = "Error sending the file message! Check file id!";

pub const ADMIN_BROADCAST_ONE_ADMIN: &str =
    "You can't broadcast messages as you are only one admin!";
pub const ADMIN_BROADCAST_INVALID_FORMAT: &str =
    "Please provide a message with the command in the format /adminbroadcast message";
pub const ADMIN_BROADCAST_UNIMPORTANT: &str =
    "You don't need to make a broadcast as you can print message directly in this chat!";

pub const BROADCAST_INVALID_FORMAT: &str =
    "Please provide a message with the command in the format /broadcast id1,id2,id3 message";
pub const BROADCAST_INVALID_IDS: &str = "Invalid broadcast ids! Not ints!";

pub fn broadcast_result(failed: &[i64], total: usize, audience: &str) -> String {
    if failed.is_empty() {
        format!("Broadcasted successfully to {} {}!", total, audience)
    } else {
        let ids: Vec<String> = failed.iter().map(i64::to_string).collect();
        format!(
            "Could not broadcast for: {}!\nBroadcasted to {}/{} {}!",
            ids.join(", "),
            total - failed.len(),
            total,
            audience
        )
    }
}

// Record layout in the realtime database, matching what the firmware-side tooling writes

pub const COMMANDS_PATH: &str = "commands";
pub const RESPONSE_PATH: &str = "response";

/// REST location of a record: `{base}/{path}.json`.
pub fn record_url(base: &str, path: &str) -> String {
    format!("{}/{}.json", base.trim_end_matches('/'), path.trim_matches('/'))
}

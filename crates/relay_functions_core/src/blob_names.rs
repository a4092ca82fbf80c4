use chrono::Timelike;
use uuid::Uuid;

pub const PLACEHOLDER_CONTENTS: &[u8] = b"This is a block blob.";
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{account}.blob.core.windows.net";
pub const DEFAULT_CONTAINER_NAME: &str = "test1";

pub fn source_blob_name(time: &impl Timelike) -> String {
    format!(
        "mylogfile{:02}{:02}{:02}.log",
        time.hour(),
        time.minute(),
        time.second()
    )
}

pub fn destination_blob_name(id: Uuid, source_name: &str) -> String {
    format!("{id}-{source_name}")
}

pub fn account_endpoint(template: &str, account: &str) -> String {
    template
        .replace("{account}", account)
        .trim_end_matches('/')
        .to_string()
}

pub fn container_endpoint(template: &str, account: &str, container: &str) -> String {
    format!("{}/{container}", account_endpoint(template, account))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    #[test]
    fn source_name_uses_zero_padded_wall_clock() {
        let time = NaiveTime::from_hms_opt(7, 5, 9).expect("valid time");
        assert_eq!(source_blob_name(&time), "mylogfile070509.log");
    }

    #[test]
    fn destination_name_prefixes_identifier() {
        let id = Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").expect("valid uuid");
        assert_eq!(
            destination_blob_name(id, "mylogfile120000.log"),
            "1b4e28ba-2fa1-11d2-883f-0016d3cca427-mylogfile120000.log"
        );
    }

    #[test]
    fn builds_public_container_endpoint() {
        assert_eq!(
            container_endpoint(DEFAULT_ENDPOINT_TEMPLATE, "sadevdmz001", "test1"),
            "https://sadevdmz001.blob.core.windows.net/test1"
        );
    }

    #[test]
    fn builds_path_style_endpoint_for_emulator() {
        assert_eq!(
            container_endpoint("http://127.0.0.1:10000/{account}/", "devstoreaccount1", "test1"),
            "http://127.0.0.1:10000/devstoreaccount1/test1"
        );
    }
}

use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Browser-reported traits sent along with a check-in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone: String,
    /// Data URL of the text the client rendered onto a canvas.
    pub canvas_data: String,
    pub device_memory: Option<f64>,
    pub hardware_concurrency: Option<u32>,
}

pub fn canvas_hash(canvas_data: &str) -> String {
    let digest = Sha256::digest(canvas_data.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Advisory blob for forensic review; carries no uniqueness guarantee.
pub fn device_fingerprint(device: &DeviceInfo, timestamp_ms: i64) -> String {
    let parts = [
        device.user_agent.clone(),
        device.language.clone(),
        device.platform.clone(),
        format!("{}x{}", device.screen_width, device.screen_height),
        device.timezone.clone(),
        canvas_hash(&device.canvas_data),
        device
            .device_memory
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        device
            .hardware_concurrency
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        timestamp_ms.to_string(),
    ];
    base64::engine::general_purpose::STANDARD.encode(parts.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceInfo {
        DeviceInfo {
            user_agent: "Mozilla/5.0".to_string(),
            language: "id-ID".to_string(),
            platform: "Linux armv8l".to_string(),
            screen_width: 412,
            screen_height: 915,
            timezone: "Asia/Jakarta".to_string(),
            canvas_data: "data:image/png;base64,AAAA".to_string(),
            device_memory: Some(4.0),
            hardware_concurrency: Some(8),
        }
    }

    #[test]
    fn fingerprint_decodes_to_pipe_separated_traits() {
        let fp = device_fingerprint(&device(), 1_760_500_000_000);
        let raw = base64::engine::general_purpose::STANDARD
            .decode(fp)
            .expect("base64");
        let text = String::from_utf8(raw).expect("utf8");
        let parts: Vec<&str> = text.split('|').collect();
        assert_eq!(parts.len(), 9);
        assert_eq!(parts[0], "Mozilla/5.0");
        assert_eq!(parts[3], "412x915");
        assert_eq!(parts[4], "Asia/Jakarta");
        assert_eq!(parts[5].len(), 64);
        assert_eq!(parts[6], "4");
        assert_eq!(parts[7], "8");
        assert_eq!(parts[8], "1760500000000");
    }

    #[test]
    fn missing_hints_are_marked_unknown() {
        let fp = device_fingerprint(&DeviceInfo::default(), 0);
        let raw = base64::engine::general_purpose::STANDARD
            .decode(fp)
            .expect("base64");
        let text = String::from_utf8(raw).expect("utf8");
        assert!(text.contains("|unknown|unknown|0"));
    }

    #[test]
    fn canvas_hash_is_sha256_hex() {
        assert_eq!(
            canvas_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

use getrandom::getrandom;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RUN_SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

pub fn validate_run_id(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("run id must be non-empty".to_string());
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err("run id must use only ASCII letters, digits, '-' or '_'".to_string())
}

/// `run-<base36 unix seconds>-<4 random base36 chars>`.
pub fn generate_run_id(now: i64) -> Result<String, String> {
    let timestamp =
        u64::try_from(now).map_err(|_| "run id requires a non-negative timestamp".to_string())?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes).map_err(|err| format!("failed to gather run id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % RUN_SUFFIX_SPACE;
    Ok(format!(
        "run-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, 4)
    ))
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_run_ids_are_valid_and_prefixed() {
        let run_id = generate_run_id(1_700_000_000).expect("run id");
        assert!(run_id.starts_with("run-"));
        assert_eq!(run_id.rsplit('-').next().map(str::len), Some(4));
        validate_run_id(&run_id).expect("valid");
    }

    #[test]
    fn negative_timestamps_are_rejected() {
        assert!(generate_run_id(-1).is_err());
    }

    #[test]
    fn run_id_validation_rejects_path_characters() {
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("run-abc_1").is_ok());
    }

    #[test]
    fn base36_encoding_matches_known_values() {
        assert_eq!(base36_encode_u64(0), "0");
        assert_eq!(base36_encode_u64(35), "z");
        assert_eq!(base36_encode_u64(36), "10");
        assert_eq!(base36_encode_fixed_u32(1, 4), "0001");
    }
}

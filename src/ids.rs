use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

/// 識別子の書式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFormat {
    /// `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`
    UuidV4,
    /// 指定バイト数の小文字16進（文字数はバイト数の2倍）
    Hex(usize),
    /// `{XXXXXXXX-XXXX-4XXX-YXXX-XXXXXXXXXXXX}`（Windows GUID 形式）
    BracedGuid,
}

impl IdFormat {
    /// この書式で新しい識別子を生成
    pub fn generate(self) -> String {
        match self {
            IdFormat::UuidV4 => uuid_v4(),
            IdFormat::Hex(bytes) => random_hex(bytes),
            IdFormat::BracedGuid => braced_guid(),
        }
    }
}

pub fn uuid_v4() -> String {
    Uuid::new_v4().to_string()
}

/// OS の乱数源から `bytes` バイト読み、16進文字列にする
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn braced_guid() -> String {
    format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_uuid_v4(s: &str) -> bool {
        let parts: Vec<&str> = s.split('-').collect();
        let lens: Vec<usize> = parts.iter().map(|p| p.len()).collect();
        lens == [8, 4, 4, 4, 12]
            && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit()))
            && parts[2].starts_with('4')
            && matches!(
                parts[3].chars().next().map(|c| c.to_ascii_lowercase()),
                Some('8' | '9' | 'a' | 'b')
            )
    }

    #[test]
    fn uuid_v4_matches_textual_format() {
        for _ in 0..32 {
            let id = uuid_v4();
            assert!(is_uuid_v4(&id), "not a v4 uuid: {}", id);
            assert_eq!(id, id.to_lowercase());
        }
    }

    #[test]
    fn hex_length_is_twice_the_byte_count() {
        for bytes in [0, 1, 16, 32, 33] {
            let hex = random_hex(bytes);
            assert_eq!(hex.len(), bytes * 2);
            assert!(hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn braced_guid_wraps_an_uppercase_v4() {
        let guid = braced_guid();
        assert!(guid.starts_with('{') && guid.ends_with('}'));
        let inner = &guid[1..guid.len() - 1];
        assert!(is_uuid_v4(inner));
        assert_eq!(inner, inner.to_uppercase());
    }

    #[test]
    fn consecutive_values_differ() {
        assert_ne!(random_hex(32), random_hex(32));
        assert_ne!(IdFormat::UuidV4.generate(), IdFormat::UuidV4.generate());
    }
}

//! Ambient configuration knobs, grouped as plain constructor-parameter
//! structs with a `Default` impl rather than a config-file layer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerLimits {
    pub max_depth: usize,
    pub max_callback_level: usize,
}

impl Default for LexerLimits {
    fn default() -> Self {
        Self {
            max_depth: 512,
            max_callback_level: usize::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFormat {
    pub indent: Vec<u8>,
    pub newline: Vec<u8>,
    pub space: Vec<u8>,
    pub noescape: bool,
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self {
            indent: Vec::new(),
            newline: Vec::new(),
            space: Vec::new(),
            noescape: false,
        }
    }
}

impl JsonFormat {
    pub fn compact() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self {
            indent: b"  ".to_vec(),
            newline: b"\n".to_vec(),
            space: b" ".to_vec(),
            noescape: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub min_size: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_bytes: 16 * 1024 * 1024,
            min_size: 0,
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(LexerLimits::default().max_depth > 0);
        assert_eq!(JsonFormat::compact().indent.len(), 0);
        assert!(CacheLimits::default().max_entries > 0);
    }
}

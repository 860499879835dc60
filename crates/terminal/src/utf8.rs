/// Incremental UTF-8 decoder for a byte stream read in arbitrary chunks.
///
/// A multi-byte sequence split across two reads is held back until the rest
/// arrives. Bytes that can never form valid UTF-8 become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is held back, e.g. at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"ls -la\r\n"), "ls -la\r\n");
        assert!(!carry.has_pending());
    }

    #[test]
    fn split_sequence_is_carried() {
        let bytes = "连接".as_bytes();
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&bytes[..2]), "");
        assert!(carry.has_pending());
        assert_eq!(carry.push(&bytes[2..4]), "连");
        assert_eq!(carry.push(&bytes[4..]), "接");
        assert!(!carry.has_pending());
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_truncated_tail() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"ok\xe4\xb8"), "ok");
        assert_eq!(carry.finish(), "\u{FFFD}");
        assert!(!carry.has_pending());
    }
}

//! Line framing for the AT byte stream
//!
//! Modems terminate lines with `\r\n`, but echoes end in a bare `\r` and some
//! firmware sends bare `\n`. Any of the three ends a line; a `\r\n` pair counts
//! once even when the two bytes arrive in different reads.

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub struct LineFramer {
    tail: Vec<u8>,
    after_cr: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning every line they complete
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\r' => {
                    lines.push(self.take_tail());
                    self.after_cr = true;
                }
                b'\n' => lines.push(self.take_tail()),
                _ => self.tail.push(byte),
            }
        }
        lines
    }

    /// Whether the unterminated tail is the `> ` input prompt
    pub fn has_prompt(&self) -> bool {
        String::from_utf8_lossy(&self.tail).trim() == ">"
    }

    /// Consume the prompt if it is pending
    pub fn take_prompt(&mut self) -> bool {
        if self.has_prompt() {
            self.tail.clear();
            true
        } else {
            false
        }
    }

    /// Bytes received since the last terminator
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }

    pub fn clear(&mut self) {
        self.tail.clear();
        self.after_cr = false;
    }

    fn take_tail(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.tail).into_owned();
        self.tail.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"\r\nOK\r\n"), vec!["", "OK"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_echo_with_bare_cr() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"AT+CSQ\r\r\n+CSQ: 23,99\r\n\r\nOK\r\n");
        assert_eq!(lines, vec!["AT+CSQ", "", "+CSQ: 23,99", "", "OK"]);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"OK\r"), vec!["OK"]);
        assert!(framer.feed(b"\n").is_empty());
        assert_eq!(framer.feed(b"+CMTI: \"SM\",7\n"), vec!["+CMTI: \"SM\",7"]);
    }

    #[test]
    fn test_tail_is_retained() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"+CS").is_empty());
        assert_eq!(framer.feed(b"Q: 1,0\r\n"), vec!["+CSQ: 1,0"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"a\xFFb\n"), vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_prompt_detection() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"AT+CMGS=18\r\r\n> "), vec!["AT+CMGS=18", ""]);
        assert!(framer.has_prompt());
        assert!(framer.take_prompt());
        assert!(!framer.has_prompt());
        assert!(!framer.take_prompt());
    }

    #[test]
    fn test_clear_drops_tail() {
        let mut framer = LineFramer::new();
        framer.feed(b"partial\r");
        framer.feed(b"more");
        framer.clear();
        assert!(framer.pending().is_empty());
        assert_eq!(framer.feed(b"\nX\n"), vec!["", "X"]);
    }
}

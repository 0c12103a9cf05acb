//! Bounds-checked octet cursor used by the decoders

use crate::error::PduError;

pub(crate) struct OctetReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OctetReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn u8(&mut self) -> Result<u8, PduError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], PduError> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(PduError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_reports_offset() {
        let data = [1u8, 2, 3];
        let mut reader = OctetReader::new(&data);
        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(
            reader.take(4),
            Err(PduError::Truncated {
                offset: 1,
                needed: 2
            })
        );
        assert_eq!(reader.rest(), &[2, 3]);
    }
}

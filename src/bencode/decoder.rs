/// Errors a decode can fail with.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BencodeError {
    MalformedInput,
}

/// Result of decoding one bencoded value (almost always a top-level dict).
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Flat stream of tokens in encounter order: string values verbatim,
    /// integers as decimal ASCII, dict keys interleaved with their values.
    pub tokens: Vec<Vec<u8>>,
    /// Byte offsets `[start, end)` of the raw `info` dictionary's encoding
    /// within the original input, if one was seen.
    pub info_span: Option<(usize, usize)>,
}

struct Cursor<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.index)
            .copied()
            .ok_or(BencodeError::MalformedInput)
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, BencodeError> {
        let start = self.index;
        while self.byte()? != delimiter {
            self.index += 1;
        }
        let slice = self.data[start..self.index].to_vec();
        self.index += 1;
        Ok(slice)
    }

    fn process(
        &mut self,
        tokens: &mut Vec<Vec<u8>>,
        info_span: &mut Option<(usize, usize)>,
    ) -> Result<(), BencodeError> {
        match self.byte()? {
            b'i' => self.process_integer(tokens),
            b'l' => self.process_list(tokens, info_span),
            b'd' => self.process_dict(tokens, info_span),
            b'0'..=b'9' => self.process_string(tokens),
            _ => Err(BencodeError::MalformedInput),
        }
    }

    fn process_integer(&mut self, tokens: &mut Vec<Vec<u8>>) -> Result<(), BencodeError> {
        self.index += 1; // consume 'i'
        let digits = self.read_until(b'e')?;
        if !looks_numeric(&digits) {
            return Err(BencodeError::MalformedInput);
        }
        tokens.push(digits);
        Ok(())
    }

    fn process_string(&mut self, tokens: &mut Vec<Vec<u8>>) -> Result<(), BencodeError> {
        let len_digits = self.read_until(b':')?;
        let len: usize = std::str::from_utf8(&len_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::MalformedInput)?;
        let end = self
            .index
            .checked_add(len)
            .ok_or(BencodeError::MalformedInput)?;
        if end > self.data.len() {
            return Err(BencodeError::MalformedInput);
        }
        tokens.push(self.data[self.index..end].to_vec());
        self.index = end;
        Ok(())
    }

    fn process_list(
        &mut self,
        tokens: &mut Vec<Vec<u8>>,
        info_span: &mut Option<(usize, usize)>,
    ) -> Result<(), BencodeError> {
        self.index += 1; // consume 'l'
        while self.byte()? != b'e' {
            self.process(tokens, info_span)?;
        }
        self.index += 1; // consume 'e'
        Ok(())
    }

    fn process_dict(
        &mut self,
        tokens: &mut Vec<Vec<u8>>,
        info_span: &mut Option<(usize, usize)>,
    ) -> Result<(), BencodeError> {
        self.index += 1; // consume 'd'
        while self.byte()? != b'e' {
            self.process(tokens, info_span)?; // key
            let key_is_info = tokens.last().map(|k| k.as_slice()) == Some(b"info".as_slice());

            let value_start = self.index;
            self.process(tokens, info_span)?; // value
            if key_is_info {
                *info_span = Some((value_start, self.index));
            }
        }
        self.index += 1; // consume 'e'
        Ok(())
    }
}

fn looks_numeric(bytes: &[u8]) -> bool {
    let rest = match bytes.first() {
        Some(b'-') => &bytes[1..],
        _ => bytes,
    };
    !rest.is_empty() && rest.iter().all(u8::is_ascii_digit)
}

/// Decodes one bencoded value from `data`, returning the flat token stream
/// and the raw `info`-dictionary byte span, if any was found.
pub fn decode(data: &[u8]) -> Result<Decoded, BencodeError> {
    let mut cursor = Cursor { data, index: 0 };
    let mut tokens = Vec::new();
    let mut info_span = None;
    cursor.process(&mut tokens, &mut info_span)?;
    Ok(Decoded { tokens, info_span })
}

/// Returns the token immediately following the first occurrence of `key` in
/// `tokens`, the way a caller walks the flat stream by key name.
pub fn find_value<'a>(tokens: &'a [Vec<u8>], key: &[u8]) -> Option<&'a [u8]> {
    tokens
        .windows(2)
        .find(|pair| pair[0] == key)
        .map(|pair| pair[1].as_slice())
}

/// Splits a `pieces` token into its 20-byte SHA-1 chunks.
pub fn piece_hashes(pieces_blob: &[u8]) -> Vec<[u8; 20]> {
    pieces_blob
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string() {
        let decoded = decode(b"4:spam").unwrap();
        assert_eq!(decoded.tokens, vec![b"spam".to_vec()]);
    }

    #[test]
    fn decodes_empty_string() {
        let decoded = decode(b"0:").unwrap();
        assert_eq!(decoded.tokens, vec![b"".to_vec()]);
    }

    #[test]
    fn decodes_positive_and_negative_integers() {
        assert_eq!(decode(b"i3e").unwrap().tokens, vec![b"3".to_vec()]);
        assert_eq!(decode(b"i-3e").unwrap().tokens, vec![b"-3".to_vec()]);
    }

    #[test]
    fn rejects_non_numeric_integer() {
        assert_eq!(decode(b"iabce"), Err(BencodeError::MalformedInput));
    }

    #[test]
    fn decodes_list_in_encounter_order() {
        let decoded = decode(b"l4:spam4:eggse").unwrap();
        assert_eq!(decoded.tokens, vec![b"spam".to_vec(), b"eggs".to_vec()]);
    }

    #[test]
    fn decodes_dict_keys_and_values_interleaved() {
        let decoded = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
        assert_eq!(
            decoded.tokens,
            vec![
                b"cow".to_vec(),
                b"moo".to_vec(),
                b"spam".to_vec(),
                b"eggs".to_vec(),
            ]
        );
    }

    #[test]
    fn records_info_dict_byte_span() {
        let data = b"d4:infod6:length3:abce7:garbagei0ee";
        let decoded = decode(data).unwrap();
        let (start, end) = decoded.info_span.expect("info span recorded");
        assert_eq!(&data[start..end], b"d6:length3:abce");
    }

    #[test]
    fn find_value_locates_key() {
        let decoded = decode(b"d3:foo3:bare").unwrap();
        assert_eq!(find_value(&decoded.tokens, b"foo"), Some(b"bar".as_slice()));
        assert_eq!(find_value(&decoded.tokens, b"missing"), None);
    }

    #[test]
    fn piece_hashes_splits_into_20_byte_chunks() {
        let blob = vec![0u8; 40];
        assert_eq!(piece_hashes(&blob).len(), 2);
    }

    #[test]
    fn truncated_string_length_is_malformed() {
        assert_eq!(decode(b"5:ab"), Err(BencodeError::MalformedInput));
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert_eq!(decode(b"d3:foo"), Err(BencodeError::MalformedInput));
    }

    #[test]
    fn invalid_type_tag_is_malformed() {
        assert_eq!(decode(b"x"), Err(BencodeError::MalformedInput));
    }

    #[test]
    fn empty_input_is_malformed() {
        assert_eq!(decode(b""), Err(BencodeError::MalformedInput));
    }
}

//! ABI decoding for the `Posted(address indexed author, string contentId)` event.

use revindex_shared::{IndexerError, Result};

use crate::rpc::RpcLog;

/// Size of one ABI word in bytes.
const WORD: usize = 32;

/// Fields carried by one edit event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedEvent {
    /// Lowercase `0x`-prefixed author address.
    pub author: String,
    pub content_id: String,
}

/// Decode an edit event from a raw log.
///
/// `topics[1]` holds the left-padded author address; `data` holds the
/// dynamic `string` as offset, length, and UTF-8 bytes.
pub fn decode_posted(log: &RpcLog) -> Result<PostedEvent> {
    let author_topic = log
        .topics
        .get(1)
        .ok_or_else(|| IndexerError::parse("log has no indexed author topic"))?;
    let author = decode_address(author_topic)?;

    let data = decode_hex(&log.data)?;
    let content_id = decode_string(&data, 0)?;

    Ok(PostedEvent { author, content_id })
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| IndexerError::parse(format!("invalid hex data: {e}")))
}

fn decode_address(topic: &str) -> Result<String> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != WORD {
        return Err(IndexerError::parse(format!(
            "address topic must be {WORD} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(&bytes[12..])))
}

/// Read a big-endian word as `usize`, rejecting values that do not fit.
fn read_word(data: &[u8], at: usize) -> Result<usize> {
    let end = at
        .checked_add(WORD)
        .ok_or_else(|| IndexerError::parse(format!("word offset {at} overflows")))?;
    let word = data
        .get(at..end)
        .ok_or_else(|| IndexerError::parse(format!("data too short for word at {at}")))?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(IndexerError::parse(format!("word at {at} overflows")));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(tail))
        .map_err(|_| IndexerError::parse(format!("word at {at} overflows")))
}

/// Decode the dynamic `string` whose head sits at word index `slot`.
fn decode_string(data: &[u8], slot: usize) -> Result<String> {
    let offset = read_word(data, slot * WORD)?;
    let len = read_word(data, offset)?;
    let start = offset + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| IndexerError::parse("string extends past end of data"))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| IndexerError::parse(format!("string is not UTF-8: {e}")))
}

/// Encode a single `string` argument the way the contract emits it.
#[cfg(test)]
pub(crate) fn encode_string_data(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::new();
    let mut word = [0u8; WORD];
    word[WORD - 1] = WORD as u8;
    out.extend_from_slice(&word);
    let mut len_word = [0u8; WORD];
    len_word[WORD - 8..].copy_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(&len_word);
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.extend(std::iter::repeat_n(0u8, padding));
    format!("0x{}", hex::encode(out))
}

/// Left-pad an address into a topic.
#[cfg(test)]
pub(crate) fn address_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x").to_lowercase())
}

//! DNS name (label) codec: decoding and encoding of the compressed label
//! sequences used throughout a DNS/mDNS message.
//!
//! A name on the wire is a sequence of length-prefixed labels terminated by
//! a zero byte, where any label position may instead be a 2-byte back-pointer
//! (top two bits `11`) redirecting decoding to an earlier offset in the same
//! buffer. All decode primitives here are bounds-checked against hostile
//! input: they never read past `size` and bound pointer-chain traversal to
//! [`MAX_SUBSTRINGS`] hops.
use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::config::{COMPRESSION_TABLE_CAPACITY, MAX_LABEL_LENGTH, MAX_NAME_LENGTH, MAX_SUBSTRINGS};
use crate::error::{MdnsError, MdnsResult};

/// One decoded step of a name: either a literal label, the zero terminator,
/// or a pointer redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substring {
    /// For a literal label: offset of the first content byte.
    /// For a pointer: the offset to resume decoding at.
    /// For the terminator: the offset of the zero byte itself.
    pub offset: usize,
    /// Label content length; 0 for the terminator and for pointers.
    pub length: usize,
    pub is_pointer: bool,
}

/// Decode a single substring (label, terminator, or pointer) at `off`.
///
/// Returns `None` on any bounds violation; callers must not read beyond
/// what this function validates.
pub fn next_substring(buf: &[u8], size: usize, off: usize) -> Option<Substring> {
    if off >= size {
        return None;
    }
    let b = buf[off];
    if b == 0 {
        return Some(Substring { offset: off, length: 0, is_pointer: false });
    }
    if b & 0xC0 == 0xC0 {
        if off + 2 > size {
            return None;
        }
        let new_off = (BigEndian::read_u16(&buf[off..off + 2]) & 0x3FFF) as usize;
        if new_off >= size {
            return None;
        }
        return Some(Substring { offset: new_off, length: 0, is_pointer: true });
    }
    let len = b as usize;
    if off + 1 + len > size {
        return None;
    }
    Some(Substring { offset: off + 1, length: len, is_pointer: false })
}

/// Advance `*off` past a single name, without decoding its text.
///
/// Positionally, a pointer ends the name: `*off` is left just past the
/// 2-byte pointer, not past whatever the pointer points to. Internally,
/// the pointer chain is still followed to validate it is acyclic and
/// bounded within [`MAX_SUBSTRINGS`] hops — a self-referential or looping
/// pointer causes `skip` to fail even though the caller's cursor never
/// visits it.
pub fn skip(buf: &[u8], size: usize, off: &mut usize) -> bool {
    let mut cur = *off;
    let mut hops = 0usize;
    loop {
        let sub = match next_substring(buf, size, cur) {
            Some(s) => s,
            None => return false,
        };
        if sub.is_pointer {
            *off = cur + 2;
            return validate_pointer_chain(buf, size, sub.offset, hops + 1);
        }
        if sub.length == 0 {
            *off = cur + 1;
            return true;
        }
        cur = sub.offset + sub.length;
        hops += 1;
        if hops > MAX_SUBSTRINGS {
            return false;
        }
    }
}

/// Walk a pointer's target purely to confirm it eventually terminates
/// without cycling, without affecting any caller-visible cursor.
fn validate_pointer_chain(buf: &[u8], size: usize, mut at: usize, mut hops: usize) -> bool {
    loop {
        if hops > MAX_SUBSTRINGS {
            return false;
        }
        let sub = match next_substring(buf, size, at) {
            Some(s) => s,
            None => return false,
        };
        if sub.is_pointer {
            at = sub.offset;
            hops += 1;
            continue;
        }
        if sub.length == 0 {
            return true;
        }
        at = sub.offset + sub.length;
        hops += 1;
    }
}

/// Compare two encoded names for equality, case-insensitively, each
/// independently following its own pointer chain. `*off_a`/`*off_b` are
/// advanced past their respective names on success.
pub fn equal(buf_a: &[u8], size_a: usize, off_a: &mut usize, buf_b: &[u8], size_b: usize, off_b: &mut usize) -> bool {
    let mut cur_a = *off_a;
    let mut cur_b = *off_b;
    let mut hops_a = 0usize;
    let mut hops_b = 0usize;
    let mut end_a: Option<usize> = None;
    let mut end_b: Option<usize> = None;

    loop {
        let sub_a = match next_substring(buf_a, size_a, cur_a) {
            Some(s) => s,
            None => return false,
        };
        if sub_a.is_pointer {
            if end_a.is_none() {
                end_a = Some(cur_a + 2);
            }
            hops_a += 1;
            if hops_a > MAX_SUBSTRINGS {
                return false;
            }
            cur_a = sub_a.offset;
            continue;
        }

        let sub_b = match next_substring(buf_b, size_b, cur_b) {
            Some(s) => s,
            None => return false,
        };
        if sub_b.is_pointer {
            if end_b.is_none() {
                end_b = Some(cur_b + 2);
            }
            hops_b += 1;
            if hops_b > MAX_SUBSTRINGS {
                return false;
            }
            cur_b = sub_b.offset;
            continue;
        }

        if sub_a.length != sub_b.length {
            return false;
        }
        if sub_a.length == 0 {
            *off_a = end_a.unwrap_or(cur_a + 1);
            *off_b = end_b.unwrap_or(cur_b + 1);
            return true;
        }

        let la = &buf_a[sub_a.offset..sub_a.offset + sub_a.length];
        let lb = &buf_b[sub_b.offset..sub_b.offset + sub_b.length];
        if !la.eq_ignore_ascii_case(lb) {
            return false;
        }
        cur_a = sub_a.offset + sub_a.length;
        cur_b = sub_b.offset + sub_b.length;
    }
}

/// Decode a name into its textual form (labels joined by `.`, trailing dot
/// included), advancing `*off` past it. The decoded text is silently
/// truncated at `out_cap` bytes; traversal still runs to completion so the
/// returned offset is correct regardless of truncation.
///
/// ```
/// use mdnslib::name::{encode_name, extract, CompressionTable};
///
/// let mut buf = Vec::new();
/// let mut table = CompressionTable::new();
/// encode_name(&mut buf, "_http._tcp.local.", &mut table).unwrap();
///
/// let mut off = 0;
/// let decoded = extract(&buf, buf.len(), &mut off, 256);
/// assert_eq!(decoded, "_http._tcp.local.");
/// ```
pub fn extract(buf: &[u8], size: usize, off: &mut usize, out_cap: usize) -> String {
    let mut out = String::new();
    let mut truncated = false;
    let mut cur = *off;
    let mut hops = 0usize;
    let mut first_pointer_end: Option<usize> = None;

    loop {
        let sub = match next_substring(buf, size, cur) {
            Some(s) => s,
            None => break,
        };
        if sub.is_pointer {
            if first_pointer_end.is_none() {
                first_pointer_end = Some(cur + 2);
            }
            hops += 1;
            if hops > MAX_SUBSTRINGS {
                break;
            }
            cur = sub.offset;
            continue;
        }
        if sub.length == 0 {
            cur = sub.offset + 1;
            break;
        }
        let label = &buf[sub.offset..sub.offset + sub.length];
        if !truncated {
            let text = String::from_utf8_lossy(label);
            if out.len() + text.len() + 1 <= out_cap {
                out.push_str(&text);
                out.push('.');
            } else {
                truncated = true;
            }
        }
        cur = sub.offset + sub.length;
        hops += 1;
        if hops > MAX_SUBSTRINGS {
            break;
        }
    }

    *off = first_pointer_end.unwrap_or(cur);
    out
}

/// Bounded ring of offsets into a message buffer where names have already
/// been written, used to find compressible suffixes while encoding.
pub struct CompressionTable {
    offsets: VecDeque<usize>,
}

impl CompressionTable {
    pub fn new() -> Self {
        CompressionTable { offsets: VecDeque::with_capacity(COMPRESSION_TABLE_CAPACITY) }
    }

    /// Insert a freshly-written label's offset, evicting the oldest entry
    /// once the ring is full.
    pub fn insert(&mut self, offset: usize) {
        if self.offsets.len() == COMPRESSION_TABLE_CAPACITY {
            self.offsets.pop_front();
        }
        self.offsets.push_back(offset);
    }

    /// Find a previously-written offset whose label sequence matches
    /// `labels` exactly, label-for-label, case-insensitively.
    fn find(&self, buf: &[u8], labels: &[&[u8]]) -> Option<usize> {
        'candidate: for &cand_off in self.offsets.iter() {
            let mut cur = cand_off;
            for label in labels {
                let sub = match next_substring(buf, buf.len(), cur) {
                    Some(s) => s,
                    None => continue 'candidate,
                };
                if sub.is_pointer || sub.length != label.len() {
                    continue 'candidate;
                }
                let candidate_label = &buf[sub.offset..sub.offset + sub.length];
                if !candidate_label.eq_ignore_ascii_case(label) {
                    continue 'candidate;
                }
                cur = sub.offset + sub.length;
            }
            return Some(cand_off);
        }
        None
    }
}

impl Default for CompressionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `name` into `buf`, honoring the compression table: a trailing
/// suffix already present in the buffer is replaced with a 2-byte pointer.
/// Freshly-written labels are recorded into `table` for subsequent calls to
/// reuse. `buf` grows as needed; capacity is enforced once by the caller
/// before transmission (see [`crate::message`]), not per-write here.
pub fn encode_name(buf: &mut Vec<u8>, name: &str, table: &mut CompressionTable) -> MdnsResult<()> {
    let trimmed = name.trim_end_matches('.');
    let labels: Vec<&[u8]> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').map(str::as_bytes).collect()
    };

    let total_len: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if total_len > MAX_NAME_LENGTH {
        return Err(MdnsError::new("name exceeds maximum encoded length"));
    }

    for i in 0..labels.len() {
        if labels[i].len() > MAX_LABEL_LENGTH {
            return Err(MdnsError::new("label exceeds 63 bytes"));
        }
        if labels[i].is_empty() {
            return Err(MdnsError::new("empty label in name"));
        }

        let suffix = &labels[i..];
        if let Some(ptr_off) = table.find(buf, suffix) {
            if ptr_off < 0x4000 {
                buf.write_u16::<BigEndian>(0xC000 | (ptr_off as u16)).unwrap();
                return Ok(());
            }
        }

        let start = buf.len();
        if start < 0x4000 {
            table.insert(start);
        }
        buf.push(labels[i].len() as u8);
        buf.extend_from_slice(labels[i]);
    }
    buf.push(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut table = CompressionTable::new();
        encode_name(&mut buf, name, &mut table).unwrap();
        buf
    }

    #[test]
    fn query_name_matches_canonical_bytes() {
        let buf = encode("_ssh._tcp.local.");
        assert_eq!(buf, b"\x04_ssh\x04_tcp\x05local\x00");
    }

    #[test]
    fn round_trip_extract_after_encode() {
        let buf = encode("foo.bar.local.");
        let mut off = 0;
        let decoded = extract(&buf, buf.len(), &mut off, 256);
        assert_eq!(decoded, "foo.bar.local.");
        assert_eq!(off, buf.len());
    }

    #[test]
    fn equal_matches_two_independent_encodings() {
        let buf_a = encode("Foo.Bar.local.");
        let mut table_b = CompressionTable::new();
        let mut buf_b = Vec::new();
        encode_name(&mut buf_b, "foo.bar.local.", &mut table_b).unwrap();

        let mut off_a = 0;
        let mut off_b = 0;
        assert!(equal(&buf_a, buf_a.len(), &mut off_a, &buf_b, buf_b.len(), &mut off_b));
        assert_eq!(off_a, buf_a.len());
        assert_eq!(off_b, buf_b.len());
    }

    #[test]
    fn builder_honors_compression_for_shared_suffix() {
        let mut buf = Vec::new();
        let mut table = CompressionTable::new();
        encode_name(&mut buf, "foo.bar.local.", &mut table).unwrap();
        let second_start = buf.len();
        encode_name(&mut buf, "baz.bar.local.", &mut table).unwrap();

        // second emission: len-prefixed "baz" followed by a 2-byte pointer
        assert_eq!(buf[second_start], 3);
        assert_eq!(&buf[second_start + 1..second_start + 4], b"baz");
        assert_eq!(buf.len() - second_start, 1 + 3 + 2);
        assert_eq!(buf.len(), 21);
        assert_eq!(buf[buf.len() - 2] & 0xC0, 0xC0);
    }

    #[test]
    fn skip_never_reads_past_buffer_end() {
        let buf = encode("a.b.");
        for start in 0..=buf.len() {
            let mut off = start;
            let _ = skip(&buf, buf.len(), &mut off);
            assert!(off <= buf.len());
        }
    }

    #[test]
    fn skip_rejects_self_referential_pointer_within_bound_hops() {
        // offset 12 holds a pointer (0xC0 0x0C) that points back to itself.
        let buf: [u8; 14] = [0x00, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x0C];
        let mut off = 12;
        assert!(!skip(&buf, buf.len(), &mut off));
        // the positional cursor still must not exceed the buffer length
        assert!(off <= buf.len());
    }

    #[test]
    fn next_substring_rejects_pointer_past_buffer() {
        let buf = [0xC0u8];
        assert!(next_substring(&buf, buf.len(), 0).is_none());
    }

    #[test]
    fn encode_name_rejects_overlong_label() {
        let long_label = "a".repeat(64);
        let name = format!("{}.local.", long_label);
        let mut buf = Vec::new();
        let mut table = CompressionTable::new();
        assert!(encode_name(&mut buf, &name, &mut table).is_err());
    }
}

//! Netlink attribute (rtattr/nlattr) handling.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Attribute type with the nested/byteorder flags stripped.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Stops at the first malformed attribute rather than failing the whole
/// message; the kernel pads dumps and trailing garbage is not an error.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// (attribute type, payload data)
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = NlAttr::from_bytes(self.data).ok()?;

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some((attr.kind(), payload))
    }
}

/// Helpers for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        match data {
            [a, b, ..] => Ok(u16::from_ne_bytes([*a, *b])),
            _ => Err(Error::InvalidAttribute("truncated u16 attribute".into())),
        }
    }

    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        match data {
            [a, b, c, d, ..] => Ok(u32::from_ne_bytes([*a, *b, *c, *d])),
            _ => Err(Error::InvalidAttribute("truncated u32 attribute".into())),
        }
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = NlAttr::new(kind, payload.len()).as_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
        buf
    }

    #[test]
    fn test_iterates_padded_attributes() {
        let mut buf = attr(3, b"eth0\0");
        buf.extend(attr(4, &1500u32.to_ne_bytes()));

        let attrs: Vec<_> = AttrIter::new(&buf).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].0, 3);
        assert_eq!(get::string(attrs[0].1).unwrap(), "eth0");
        assert_eq!(get::u32_ne(attrs[1].1).unwrap(), 1500);
    }

    #[test]
    fn test_nested_flag_is_stripped() {
        let buf = attr(18 | NLA_F_NESTED, &[]);
        let (kind, payload) = AttrIter::new(&buf).next().unwrap();
        assert_eq!(kind, 18);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_truncated_attribute_ends_iteration() {
        let mut buf = attr(3, b"eth0\0");
        // Claims 64 bytes but only the header follows.
        buf.extend_from_slice(NlAttr::new(4, 60).as_bytes());
        assert_eq!(AttrIter::new(&buf).count(), 1);
    }

    #[test]
    fn test_get_rejects_short_payloads() {
        assert!(get::u16_ne(&[1]).is_err());
        assert!(get::u32_ne(&[1, 2, 3]).is_err());
    }
}

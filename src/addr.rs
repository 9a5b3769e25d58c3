use std::error::Error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::BitOr;

/// Flags selecting which textual forms `parse_ip` accepts.
///
/// `V4` and `V6` gate the address families; `NETWORK` additionally allows
/// the CIDR `addr/len` syntax. Combine them with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFlags(u8);

impl ParseFlags {
    pub const V4: ParseFlags = ParseFlags(0x01);
    pub const V6: ParseFlags = ParseFlags(0x02);
    pub const NETWORK: ParseFlags = ParseFlags(0x04);
    /// Both families, CIDR allowed.
    pub const ANY: ParseFlags = ParseFlags(0x07);

    pub fn contains(self, other: ParseFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ParseFlags {
    type Output = ParseFlags;
    fn bitor(self, rhs: ParseFlags) -> ParseFlags {
        ParseFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    V4,
    V6,
}

impl AddrFamily {
    pub fn bit_width(self) -> u8 {
        match self {
            AddrFamily::V4 => 32,
            AddrFamily::V6 => 128,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            AddrFamily::V4 => 4,
            AddrFamily::V6 => 16,
        }
    }
}

/// A parsed IPv4/IPv6 address or network in canonical binary form.
///
/// The octets are stored in network byte order; only the first
/// `family().byte_len()` bytes are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddress {
    family: AddrFamily,
    octets: [u8; 16],
    prefix_len: u8,
    is_network: bool,
}

impl ParsedAddress {
    /// A plain IPv4 host address (full prefix, not a network).
    pub fn host_v4(ip: Ipv4Addr) -> ParsedAddress {
        let mut octets = [0u8; 16];
        octets[..4].copy_from_slice(&ip.octets());
        ParsedAddress {
            family: AddrFamily::V4,
            octets,
            prefix_len: 32,
            is_network: false,
        }
    }

    pub fn family(&self) -> AddrFamily {
        self.family
    }

    /// The binary address, 4 or 16 bytes depending on the family.
    pub fn bytes(&self) -> &[u8] {
        &self.octets[..self.family.byte_len()]
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn is_network(&self) -> bool {
        self.is_network
    }

    pub fn ip(&self) -> IpAddr {
        match self.family {
            AddrFamily::V4 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&self.octets[..4]);
                IpAddr::V4(Ipv4Addr::from(b))
            }
            AddrFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.octets)),
        }
    }
}

impl fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_network {
            write!(f, "{}/{}", self.ip(), self.prefix_len)
        } else {
            write!(f, "{}", self.ip())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The input was empty.
    Empty,
    /// The detected family is not permitted by the flags.
    FamilyNotAllowed,
    /// CIDR syntax used without the `NETWORK` flag.
    NetworkNotAllowed,
    /// The address part is not a valid address of the detected family.
    InvalidAddress,
    /// The prefix is missing, not decimal, or has extra leading zeros.
    InvalidPrefix,
    /// The prefix exceeds the family's bit width.
    PrefixOutOfRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::Empty => "empty address",
            ParseError::FamilyNotAllowed => "address family not allowed here",
            ParseError::NetworkNotAllowed => "network syntax not allowed here",
            ParseError::InvalidAddress => "invalid address",
            ParseError::InvalidPrefix => "invalid network prefix",
            ParseError::PrefixOutOfRange => "network prefix out of range",
        };
        write!(f, "{msg}")
    }
}

impl Error for ParseError {}

/// Parse a textual IPv4/IPv6 address, optionally with a `/len` suffix.
///
/// The family is detected from the syntax (a ':' implies IPv6) and then
/// checked against `flags`. Without a '/' the result is a host address;
/// its prefix length is the family's full bit width when `NETWORK` is
/// allowed and 0 otherwise. Pure function, safe for concurrent calls.
pub fn parse_ip(text: &str, flags: ParseFlags) -> Result<ParsedAddress, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (addr_text, prefix_text) = match text.rsplit_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (text, None),
    };

    let family = if addr_text.contains(':') {
        AddrFamily::V6
    } else {
        AddrFamily::V4
    };
    let family_allowed = match family {
        AddrFamily::V4 => flags.contains(ParseFlags::V4),
        AddrFamily::V6 => flags.contains(ParseFlags::V6),
    };
    if !family_allowed {
        return Err(ParseError::FamilyNotAllowed);
    }

    let (prefix_len, is_network) = match prefix_text {
        Some(prefix) => {
            if !flags.contains(ParseFlags::NETWORK) {
                return Err(ParseError::NetworkNotAllowed);
            }
            (parse_prefix(prefix, family.bit_width())?, true)
        }
        None if flags.contains(ParseFlags::NETWORK) => (family.bit_width(), false),
        None => (0, false),
    };

    let mut octets = [0u8; 16];
    match family {
        AddrFamily::V4 => match parse_v4(addr_text) {
            Some(b) => octets[..4].copy_from_slice(&b),
            None => return Err(ParseError::InvalidAddress),
        },
        AddrFamily::V6 => match parse_v6(addr_text) {
            Some(b) => octets.copy_from_slice(&b),
            None => return Err(ParseError::InvalidAddress),
        },
    }

    Ok(ParsedAddress {
        family,
        octets,
        prefix_len,
        is_network,
    })
}

fn parse_prefix(text: &str, max: u8) -> Result<u8, ParseError> {
    if text.is_empty() || !text.bytes().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidPrefix);
    }
    // a single "0" is fine, "07" is not
    if text.len() > 1 && text.starts_with('0') {
        return Err(ParseError::InvalidPrefix);
    }
    let value: u32 = text.parse().map_err(|_| ParseError::PrefixOutOfRange)?;
    if value > u32::from(max) {
        return Err(ParseError::PrefixOutOfRange);
    }
    Ok(value as u8)
}

/// Strict dotted-quad: exactly four decimal octets, no hex, no shorthand.
fn parse_v4(text: &str) -> Option<[u8; 4]> {
    let mut out = [0u8; 4];
    let mut group = 0usize;
    let mut saw_digit = false;
    for &c in text.as_bytes() {
        match c {
            b'0'..=b'9' => {
                if !saw_digit {
                    if group == 4 {
                        return None;
                    }
                    saw_digit = true;
                }
                let value = u16::from(out[group]) * 10 + u16::from(c - b'0');
                if value > 255 {
                    return None;
                }
                out[group] = value as u8;
            }
            b'.' if saw_digit => {
                group += 1;
                saw_digit = false;
            }
            _ => return None,
        }
    }
    if !saw_digit || group != 3 {
        return None;
    }
    Some(out)
}

/// RFC-1884 textual IPv6, including '::' compression and an embedded
/// dotted-quad tail.
fn parse_v6(text: &str) -> Option<[u8; 16]> {
    let bytes = text.as_bytes();
    let mut tmp = [0u8; 16];
    let mut tp = 0usize;
    let mut colonp: Option<usize> = None;
    let mut i = 0usize;

    // a leading ':' is only valid as part of '::'
    if bytes.first() == Some(&b':') {
        if bytes.get(1) != Some(&b':') {
            return None;
        }
        i = 1;
    }

    let mut saw_xdigit = false;
    let mut count_xdigit = 0usize;
    let mut val: u32 = 0;
    let mut curtok = i;

    while i < bytes.len() {
        let ch = bytes[i];
        i += 1;
        if let Some(d) = (ch as char).to_digit(16) {
            if count_xdigit >= 4 {
                return None;
            }
            val = (val << 4) | d;
            saw_xdigit = true;
            count_xdigit += 1;
            continue;
        }
        if ch == b':' {
            curtok = i;
            if !saw_xdigit {
                if colonp.is_some() {
                    return None;
                }
                colonp = Some(tp);
                continue;
            } else if i == bytes.len() {
                // trailing single ':'
                return None;
            }
            if tp + 2 > 16 {
                return None;
            }
            tmp[tp] = (val >> 8) as u8;
            tmp[tp + 1] = (val & 0xff) as u8;
            tp += 2;
            saw_xdigit = false;
            count_xdigit = 0;
            val = 0;
            continue;
        }
        if ch == b'.' && tp + 4 <= 16 {
            if let Some(v4) = parse_v4(&text[curtok..]) {
                tmp[tp..tp + 4].copy_from_slice(&v4);
                tp += 4;
                saw_xdigit = false;
                break;
            }
        }
        return None;
    }

    if saw_xdigit {
        if tp + 2 > 16 {
            return None;
        }
        tmp[tp] = (val >> 8) as u8;
        tmp[tp + 1] = (val & 0xff) as u8;
        tp += 2;
    }

    if let Some(cp) = colonp {
        // a full address has no room left for '::'
        if tp == 16 {
            return None;
        }
        let n = tp - cp;
        for k in 1..=n {
            tmp[16 - k] = tmp[cp + n - k];
            tmp[cp + n - k] = 0;
        }
        tp = 16;
    }

    if tp != 16 {
        return None;
    }
    Some(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_host() {
        let a = parse_ip("10.0.0.1", ParseFlags::V4).unwrap();
        assert_eq!(a.family(), AddrFamily::V4);
        assert_eq!(a.bytes(), &[10, 0, 0, 1]);
        assert_eq!(a.prefix_len(), 0);
        assert!(!a.is_network());
        assert_eq!(a.to_string(), "10.0.0.1");
    }

    #[test]
    fn v4_host_with_network_allowed() {
        let a = parse_ip("192.168.0.8", ParseFlags::V4 | ParseFlags::NETWORK).unwrap();
        assert_eq!(a.prefix_len(), 32);
        assert!(!a.is_network());
    }

    #[test]
    fn v4_network() {
        for n in [0u8, 1, 8, 24, 32] {
            let a = parse_ip(
                &format!("10.1.2.0/{n}"),
                ParseFlags::V4 | ParseFlags::NETWORK,
            )
            .unwrap();
            assert!(a.is_network());
            assert_eq!(a.prefix_len(), n);
        }
    }

    #[test]
    fn v4_rejects_malformed() {
        for bad in [
            "", "10.0.0", "10.0.0.0.1", "256.0.0.1", "10..0.1", "10.0.0.1.", ".10.0.0.1",
            "10.0.0.x", "10.0.0.1 ",
        ] {
            assert!(parse_ip(bad, ParseFlags::ANY).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn v4_prefix_bounds() {
        let flags = ParseFlags::V4 | ParseFlags::NETWORK;
        assert_eq!(
            parse_ip("10.0.0.0/33", flags),
            Err(ParseError::PrefixOutOfRange)
        );
        assert_eq!(
            parse_ip("10.0.0.0/999999999999", flags),
            Err(ParseError::PrefixOutOfRange)
        );
        assert_eq!(parse_ip("10.0.0.0/", flags), Err(ParseError::InvalidPrefix));
        assert_eq!(
            parse_ip("10.0.0.0/08", flags),
            Err(ParseError::InvalidPrefix)
        );
        assert_eq!(
            parse_ip("10.0.0.0/+8", flags),
            Err(ParseError::InvalidPrefix)
        );
        assert!(parse_ip("10.0.0.0/0", flags).is_ok());
    }

    #[test]
    fn network_syntax_requires_flag() {
        assert_eq!(
            parse_ip("10.0.0.0/24", ParseFlags::V4),
            Err(ParseError::NetworkNotAllowed)
        );
    }

    #[test]
    fn family_gating() {
        assert_eq!(
            parse_ip("10.0.0.1", ParseFlags::V6),
            Err(ParseError::FamilyNotAllowed)
        );
        assert_eq!(
            parse_ip("::1", ParseFlags::V4),
            Err(ParseError::FamilyNotAllowed)
        );
    }

    #[test]
    fn v6_loopback() {
        let a = parse_ip("::1", ParseFlags::V6).unwrap();
        assert_eq!(a.family(), AddrFamily::V6);
        let mut expected = [0u8; 16];
        expected[15] = 1;
        assert_eq!(a.bytes(), &expected);
    }

    #[test]
    fn v6_compressions() {
        let full = parse_ip("2001:0db8:0000:0000:0000:0000:0000:0001", ParseFlags::V6).unwrap();
        let short = parse_ip("2001:db8::1", ParseFlags::V6).unwrap();
        assert_eq!(full.bytes(), short.bytes());

        let a = parse_ip("::", ParseFlags::V6).unwrap();
        assert_eq!(a.bytes(), &[0u8; 16]);

        let b = parse_ip("fe80::", ParseFlags::V6).unwrap();
        assert_eq!(&b.bytes()[..2], &[0xfe, 0x80]);
        assert_eq!(&b.bytes()[2..], &[0u8; 14]);
    }

    #[test]
    fn v6_embedded_v4_tail() {
        let a = parse_ip("::ffff:10.0.0.1", ParseFlags::V6).unwrap();
        let mut expected = [0u8; 16];
        expected[10] = 0xff;
        expected[11] = 0xff;
        expected[12..].copy_from_slice(&[10, 0, 0, 1]);
        assert_eq!(a.bytes(), &expected);
    }

    #[test]
    fn v6_rejects_malformed() {
        for bad in [
            ":", ":1", "1:", "1::2::3", "12345::1", "1:2:3:4:5:6:7:8:9",
            "1:2:3:4:5:6:7", "::1::", "2001:db8:::1",
        ] {
            assert!(parse_ip(bad, ParseFlags::ANY).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn v6_network() {
        let a = parse_ip("2001:db8::/64", ParseFlags::V6 | ParseFlags::NETWORK).unwrap();
        assert!(a.is_network());
        assert_eq!(a.prefix_len(), 64);
        assert_eq!(
            parse_ip("::1/129", ParseFlags::V6 | ParseFlags::NETWORK),
            Err(ParseError::PrefixOutOfRange)
        );
    }
}

//! Parser for File-I/O syscall reply packets.
//!
//! After the server forwards a syscall with an `F` request, the client
//! answers `F<retcode>[,<errno>[,C]]`. All fields are signed hex; a
//! non-zero errno requires a retcode of -1 and replaces it with `-errno`;
//! a trailing `C` means the user hit ctrl-C while the host serviced the
//! call.

/// A successfully parsed syscall reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyscallReply {
    /// Result for the target's return register: the syscall result, or
    /// `-errno` when the host call failed.
    pub retcode: i64,
    /// The host saw a ctrl-C during the I/O.
    pub ctrl_c: bool,
}

impl SyscallReply {
    /// Parse a reply payload. `None` means the packet is malformed.
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix('F')?;
        let (retcode, rest) = parse_value(rest)?;

        if rest.is_empty() {
            return Some(Self {
                retcode,
                ctrl_c: false,
            });
        }

        let rest = rest.strip_prefix(',')?;
        let (errno, rest) = parse_value(rest)?;
        if errno < 0 {
            return None;
        }
        let retcode = if errno > 0 {
            // A failing call must report -1; the errno travels in the
            // return register, negated.
            if retcode != -1 {
                return None;
            }
            -errno
        } else {
            retcode
        };

        if rest.is_empty() {
            return Some(Self {
                retcode,
                ctrl_c: false,
            });
        }

        let rest = rest.strip_prefix(',')?;
        if rest != "C" {
            return None;
        }
        Some(Self {
            retcode,
            ctrl_c: true,
        })
    }
}

/// Parse one signed hex field, returning it and the unconsumed tail. The
/// field must end at a `,` or at the end of input.
fn parse_value(s: &str) -> Option<(i64, &str)> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let rest = &digits[end..];
    if !rest.is_empty() && !rest.starts_with(',') {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits[..end], 16).ok()?;
    Some((if neg { -magnitude } else { magnitude }, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_result() {
        assert_eq!(
            SyscallReply::parse("F5"),
            Some(SyscallReply {
                retcode: 5,
                ctrl_c: false
            })
        );
    }

    #[test]
    fn negative_result_without_errno() {
        assert_eq!(
            SyscallReply::parse("F-1"),
            Some(SyscallReply {
                retcode: -1,
                ctrl_c: false
            })
        );
    }

    #[test]
    fn errno_replaces_retcode() {
        assert_eq!(
            SyscallReply::parse("F-1,9"),
            Some(SyscallReply {
                retcode: -9,
                ctrl_c: false
            })
        );
    }

    #[test]
    fn errno_requires_minus_one_retcode() {
        assert_eq!(SyscallReply::parse("F5,9"), None);
    }

    #[test]
    fn zero_errno_keeps_retcode() {
        assert_eq!(
            SyscallReply::parse("F5,0"),
            Some(SyscallReply {
                retcode: 5,
                ctrl_c: false
            })
        );
    }

    #[test]
    fn ctrl_c_marker() {
        assert_eq!(
            SyscallReply::parse("F-1,4,C"),
            Some(SyscallReply {
                retcode: -4,
                ctrl_c: true
            })
        );
    }

    #[test]
    fn malformed_replies() {
        assert_eq!(SyscallReply::parse("G5"), None);
        assert_eq!(SyscallReply::parse("F"), None);
        assert_eq!(SyscallReply::parse("F5,"), None);
        assert_eq!(SyscallReply::parse("F-1,-2"), None);
        assert_eq!(SyscallReply::parse("F5,0,X"), None);
        assert_eq!(SyscallReply::parse("F5xyz"), None);
    }
}

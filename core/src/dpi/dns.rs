//! DNS query-name extraction.

/// Decode the first question's name from a DNS message, without the
/// trailing dot. Returns `None` for anything that is not a query.
pub fn query_name(payload: &[u8]) -> Option<String> {
    let packet = dns_parser::Packet::parse(payload).ok()?;
    let question = packet.questions.first()?;
    let name = question.qname.to_string();
    Some(name.trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // A standard query for chat.openai.com, type A.
    fn sample_query(name: &str) -> Vec<u8> {
        let mut out = vec![
            0x12, 0x34, // id
            0x01, 0x00, // standard query, recursion desired
            0x00, 0x01, // one question
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        for label in name.split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0x00);
        out.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
        out
    }

    #[test]
    fn decodes_query_name_without_trailing_dot() {
        let payload = sample_query("chat.openai.com");
        assert_eq!(query_name(&payload).as_deref(), Some("chat.openai.com"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(query_name(b"not dns"), None);
        assert_eq!(query_name(&[]), None);
    }
}

//! TLS Client Hello inspection: SNI extraction and JA3 fingerprinting.
//!
//! JA3 is the MD5 of `"TLSVersion,Ciphers,Extensions,EllipticCurves,
//! ECPointFormats"` with each list dash-joined, computed over the Client
//! Hello. GREASE values (RFC 8701) are reserved placeholders injected by
//! modern clients and are excluded from the fingerprint.

use tls_parser::{
    parse_tls_extensions, parse_tls_plaintext, TlsExtension, TlsExtensionType, TlsMessage,
    TlsMessageHandshake,
};

/// Identity extracted from a Client Hello.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub sni: Option<String>,
    pub ja3: Option<String>,
}

/// GREASE pattern: `0x?a?a` where both nibbles repeat.
fn is_grease(v: u16) -> bool {
    (v & 0x0f0f) == 0x0a0a
}

fn dash_join(values: &[u16]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Parse a TLS record carrying a Client Hello.
///
/// Returns `None` unless the payload starts a handshake record (type 0x16)
/// whose first message is a Client Hello (type 0x01). Any decode error
/// aborts the upgrade, never the event.
pub fn inspect(payload: &[u8]) -> Option<TlsInfo> {
    let (_, plaintext) = parse_tls_plaintext(payload).ok()?;

    for msg in &plaintext.msg {
        let hello = match msg {
            TlsMessage::Handshake(TlsMessageHandshake::ClientHello(hello)) => hello,
            _ => continue,
        };

        let mut info = TlsInfo::default();

        let ciphers: Vec<u16> = hello
            .ciphers
            .iter()
            .map(|c| c.0)
            .filter(|c| !is_grease(*c))
            .collect();

        let mut extension_ids: Vec<u16> = Vec::new();
        let mut curves: Vec<u16> = Vec::new();
        let mut point_formats: Vec<u16> = Vec::new();

        if let Some(ext_bytes) = hello.ext {
            if let Ok((_, extensions)) = parse_tls_extensions(ext_bytes) {
                for ext in &extensions {
                    let id = TlsExtensionType::from(ext).0;
                    if !is_grease(id) {
                        extension_ids.push(id);
                    }
                    match ext {
                        TlsExtension::SNI(names) => {
                            if let Some(&(_, raw)) = names.first() {
                                if let Ok(name) = std::str::from_utf8(raw) {
                                    info.sni = Some(name.to_string());
                                }
                            }
                        }
                        TlsExtension::EllipticCurves(groups) => {
                            curves = groups
                                .iter()
                                .map(|g| g.0)
                                .filter(|g| !is_grease(*g))
                                .collect();
                        }
                        TlsExtension::EcPointFormats(formats) => {
                            point_formats = formats.iter().map(|f| *f as u16).collect();
                        }
                        _ => {}
                    }
                }
            }
        }

        let fingerprint = format!(
            "{},{},{},{},{}",
            hello.version.0,
            dash_join(&ciphers),
            dash_join(&extension_ids),
            dash_join(&curves),
            dash_join(&point_formats),
        );
        info.ja3 = Some(format!("{:x}", md5::compute(fingerprint.as_bytes())));

        return Some(info);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal TLS 1.2 Client Hello carrying one cipher, the SNI extension
    // (example.com), one curve, and one EC point format.
    fn sample_client_hello() -> Vec<u8> {
        let sni_name = b"example.com";
        let mut ext = Vec::new();
        // server_name extension (0x0000)
        let sni_list_len = sni_name.len() + 3;
        ext.extend_from_slice(&[0x00, 0x00]);
        ext.extend_from_slice(&((sni_list_len + 2) as u16).to_be_bytes());
        ext.extend_from_slice(&(sni_list_len as u16).to_be_bytes());
        ext.push(0x00); // host_name
        ext.extend_from_slice(&(sni_name.len() as u16).to_be_bytes());
        ext.extend_from_slice(sni_name);
        // supported_groups (0x000a): secp256r1
        ext.extend_from_slice(&[0x00, 0x0a, 0x00, 0x04, 0x00, 0x02, 0x00, 0x17]);
        // ec_point_formats (0x000b): uncompressed
        ext.extend_from_slice(&[0x00, 0x0b, 0x00, 0x02, 0x01, 0x00]);

        let mut hello = Vec::new();
        hello.extend_from_slice(&[0x03, 0x03]); // client_version TLS 1.2
        hello.extend_from_slice(&[0u8; 32]); // random
        hello.push(0x00); // session id length
        hello.extend_from_slice(&[0x00, 0x02, 0xc0, 0x2f]); // one cipher suite
        hello.extend_from_slice(&[0x01, 0x00]); // null compression
        hello.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        hello.extend_from_slice(&ext);

        let mut handshake = Vec::new();
        handshake.push(0x01); // client hello
        let len = hello.len();
        handshake.extend_from_slice(&[(len >> 16) as u8, (len >> 8) as u8, len as u8]);
        handshake.extend_from_slice(&hello);

        let mut record = Vec::new();
        record.push(0x16); // handshake record
        record.extend_from_slice(&[0x03, 0x01]);
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn extracts_sni_and_ja3() {
        let info = inspect(&sample_client_hello()).unwrap();
        assert_eq!(info.sni.as_deref(), Some("example.com"));
        let ja3 = info.ja3.unwrap();
        assert_eq!(ja3.len(), 32);
        assert!(ja3.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ja3_is_deterministic() {
        let a = inspect(&sample_client_hello()).unwrap().ja3.unwrap();
        let b = inspect(&sample_client_hello()).unwrap().ja3.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_handshake_record_is_rejected() {
        // Application data record
        let payload = [0x17, 0x03, 0x03, 0x00, 0x02, 0xde, 0xad];
        assert_eq!(inspect(&payload), None);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut record = sample_client_hello();
        record.truncate(8);
        assert_eq!(inspect(&record), None);
    }

    #[test]
    fn grease_pattern() {
        assert!(is_grease(0x0a0a));
        assert!(is_grease(0x1a1a));
        assert!(is_grease(0xfafa));
        assert!(!is_grease(0x1301));
        assert!(!is_grease(0x0a0b));
    }
}

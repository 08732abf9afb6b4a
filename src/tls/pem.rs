//! PEM certificate and key loading.

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::io;

/// Parses a PEM stream into its ordered sequence of certificates.
pub fn load_certificates(pem: &[u8]) -> io::Result<Vec<CertificateDer<'static>>> {
    let mut input = pem;
    let certs = rustls_pemfile::certs(&mut input).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no certificate found in pem input",
        ));
    }

    Ok(certs)
}

/// Parses a single unencrypted private key from a PEM stream.
///
/// Key formats are attempted in a fixed order — PKCS#8, then PKCS#1
/// (RSA), then SEC1 (EC) — and the call fails only if none decodes.
pub fn load_private_key(pem: &[u8]) -> io::Result<PrivateKeyDer<'static>> {
    let mut input = pem;
    if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut input).next() {
        return Ok(PrivateKeyDer::Pkcs8(key?));
    }

    let mut input = pem;
    if let Some(key) = rustls_pemfile::rsa_private_keys(&mut input).next() {
        return Ok(PrivateKeyDer::Pkcs1(key?));
    }

    let mut input = pem;
    if let Some(key) = rustls_pemfile::ec_private_keys(&mut input).next() {
        return Ok(PrivateKeyDer::Sec1(key?));
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "no unencrypted pkcs#8, pkcs#1 or sec1 private key found in pem input",
    ))
}

#[cfg(test)]
mod tests {
    use super::{load_certificates, load_private_key};
    use rustls_pki_types::PrivateKeyDer;

    #[test]
    fn loads_generated_certificate_and_key() {
        let signed = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let certs = load_certificates(signed.cert.pem().as_bytes()).unwrap();
        assert_eq!(certs.len(), 1);

        let key = load_private_key(signed.key_pair.serialize_pem().as_bytes()).unwrap();
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn loads_certificate_sequence_in_order() {
        let first = rcgen::generate_simple_self_signed(vec!["a.test".to_string()]).unwrap();
        let second = rcgen::generate_simple_self_signed(vec!["b.test".to_string()]).unwrap();

        let mut pem = first.cert.pem();
        pem.push_str(&second.cert.pem());

        let certs = load_certificates(pem.as_bytes()).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], *first.cert.der());
        assert_eq!(certs[1], *second.cert.der());
    }

    #[test]
    fn rejects_input_without_key() {
        let signed = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        assert!(load_private_key(signed.cert.pem().as_bytes()).is_err());
    }
}

//! Client certificate handling.
//!
//! The upstream services authenticate callers with a client certificate that
//! ships as a PKCS#12 bundle. The HTTP client wants PEM files, so every
//! upstream call unpacks the bundle into two temporary files. Those files hold
//! an unencrypted private key: [`MaterializedCredential`] owns them and
//! removes both when closed or dropped, whichever comes first.

use crate::error::CredentialError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use openssl::pkcs12::Pkcs12;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, TempPath};

/// A PKCS#12 bundle and its passphrase.
#[derive(Clone)]
pub struct CredentialBundle {
    der: Vec<u8>,
    passphrase: String,
}

impl CredentialBundle {
    /// Wrap raw PKCS#12 (DER) bytes.
    pub fn new(der: Vec<u8>, passphrase: impl Into<String>) -> Self {
        Self {
            der,
            passphrase: passphrase.into(),
        }
    }

    /// Decode a base64-encoded bundle, as stored in `CERT_PFX_BASE64`.
    pub fn from_base64(encoded: &str, passphrase: impl Into<String>) -> Result<Self, CredentialError> {
        let der = STANDARD.decode(encoded.trim())?;
        Ok(Self::new(der, passphrase))
    }

    /// Read a `.pfx` / `.p12` file.
    pub fn from_file(path: &Path, passphrase: impl Into<String>) -> Result<Self, CredentialError> {
        let der = std::fs::read(path)?;
        Ok(Self::new(der, passphrase))
    }

    /// Unpack the bundle into temporary PEM files in the system temp dir.
    pub fn materialize(&self) -> Result<MaterializedCredential, CredentialError> {
        self.materialize_in(&std::env::temp_dir())
    }

    /// Unpack the bundle into temporary PEM files inside `dir`.
    ///
    /// Only the private key and the leaf certificate are written; any CA
    /// certificates in the bundle are ignored. The bundle is fully decoded
    /// before the first file is created, so a bad passphrase leaves nothing
    /// behind on disk.
    pub fn materialize_in(&self, dir: &Path) -> Result<MaterializedCredential, CredentialError> {
        let parsed = Pkcs12::from_der(&self.der)
            .and_then(|p12| p12.parse2(&self.passphrase))
            .map_err(|e| CredentialError::Pkcs12(e.to_string()))?;

        let pkey = parsed.pkey.ok_or(CredentialError::MissingKey)?;
        let cert = parsed.cert.ok_or(CredentialError::MissingCertificate)?;

        let key_pem = pkey
            .private_key_to_pem_pkcs8()
            .map_err(|e| CredentialError::Pem(e.to_string()))?;
        let cert_pem = cert.to_pem().map_err(|e| CredentialError::Pem(e.to_string()))?;

        // If the key file fails, dropping `cert` removes the first file
        let cert = write_temp(dir, "relay-cert-", &cert_pem)?;
        let key = write_temp(dir, "relay-key-", &key_pem)?;

        Ok(MaterializedCredential { cert, key })
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("der", &format_args!("<{} bytes>", self.der.len()))
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Create a uniquely named, owner-only file containing `contents`.
fn write_temp(dir: &Path, prefix: &str, contents: &[u8]) -> Result<TempPath, CredentialError> {
    let mut file = Builder::new().prefix(prefix).suffix(".pem").tempfile_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    Ok(file.into_temp_path())
}

/// Certificate and private key written to temporary PEM files.
///
/// Both files are deleted by [`close`](Self::close) or, failing that, on drop.
#[derive(Debug)]
pub struct MaterializedCredential {
    cert: TempPath,
    key: TempPath,
}

impl MaterializedCredential {
    /// Path of the PEM certificate.
    pub fn cert_path(&self) -> &Path {
        &self.cert
    }

    /// Path of the unencrypted PEM private key.
    pub fn key_path(&self) -> &Path {
        &self.key
    }

    /// Delete both files now, reporting any failure.
    ///
    /// The key file is removed even when removing the certificate fails.
    pub fn close(self) -> Result<(), CredentialError> {
        let cert = self.cert.close();
        let key = self.key.close();
        cert?;
        key?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Throwaway PKCS#12 bundles for tests.

    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkcs12::Pkcs12;
    use openssl::pkey::{PKey, Private};
    use openssl::stack::Stack;
    use openssl::x509::{X509NameBuilder, X509};

    pub const PASSPHRASE: &str = "test-passphrase";

    pub fn self_signed(common_name: &str) -> (PKey<Private>, X509) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let pkey = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        let not_before = Asn1Time::days_from_now(0).unwrap();
        builder.set_not_before(&not_before).unwrap();
        let not_after = Asn1Time::days_from_now(30).unwrap();
        builder.set_not_after(&not_after).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        (pkey, builder.build())
    }

    /// PKCS#12 DER for `pkey`/`cert`, optionally carrying a CA chain.
    pub fn bundle_der(pkey: &PKey<Private>, cert: &X509, chain: &[X509]) -> Vec<u8> {
        let mut builder = Pkcs12::builder();
        builder.name("relay-client").pkey(pkey).cert(cert);
        if !chain.is_empty() {
            let mut stack = Stack::new().unwrap();
            for ca in chain {
                stack.push(ca.clone()).unwrap();
            }
            builder.ca(stack);
        }
        builder.build2(PASSPHRASE).unwrap().to_der().unwrap()
    }
}

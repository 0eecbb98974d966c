//! Root CA and SSH key minting for tenant clusters
//!
//! The root CA anchors every certificate a tenant control plane will ever
//! use, so its parameters are deliberately rigid: RSA-2048, self-signed,
//! ten-year validity, common name `root-ca.<name>.<dc>.<external-url>`.
//! Key generation happens in the `rsa` crate; `rcgen` consumes the key via
//! PEM and signs with PKCS#1 v1.5 / SHA-256.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
    KeyUsagePurpose,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use time::OffsetDateTime;

use crate::crd::RootCa;
use crate::{Error, Result};

/// RSA modulus size for the root CA and SSH keys
pub const RSA_KEY_BITS: usize = 2048;

/// Root CA validity, expressed in hours (ten years)
pub const CA_VALIDITY_HOURS: i64 = 24 * 365 * 10;

/// Mint a self-signed root certificate authority.
///
/// Returns the certificate and private key as PEM. The caller owns
/// idempotence: minting is unconditional here.
pub fn mint_root_ca(common_name: &str) -> Result<RootCa> {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
        .map_err(|e| Error::pki(format!("failed to generate root-ca key: {e}")))?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::pki(format!("failed to encode root-ca key: {e}")))?
        .to_string();

    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| Error::pki(format!("failed to load root-ca key: {e}")))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::hours(CA_VALIDITY_HOURS);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::pki(format!("failed to create root-ca: {e}")))?;

    Ok(RootCa {
        cert: cert.pem(),
        key: key_pem,
    })
}

/// An RSA keypair for the apiserver SSH tunnel secret.
pub struct SshKeyPair {
    /// PKCS#1 PEM, the classic `id_rsa` layout
    pub private_key_pem: String,
    /// SPKI PEM, recorded on the cluster status
    pub public_key_pem: String,
}

impl SshKeyPair {
    /// Generate a fresh RSA-2048 keypair.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
            .map_err(|e| Error::pki(format!("failed to generate ssh key: {e}")))?;
        let private_key_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::pki(format!("failed to encode ssh private key: {e}")))?
            .to_string();
        let public_key_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::pki(format!("failed to encode ssh public key: {e}")))?;
        Ok(Self {
            private_key_pem,
            public_key_pem,
        })
    }
}

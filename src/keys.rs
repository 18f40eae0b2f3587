//! Curve key material
//!
//! The agent owns one server keypair (the frontend's identity) and
//! knows one client keypair (the single trusted peer). Keys persist in
//! the settings file Z85-encoded and are read-only after construction.

use crate::constants::settings as keys;
use crate::error::AgentError;
use crate::settings::SettingsStore;

/// One Curve keypair
#[derive(Clone)]
pub struct CurveKeys {
    pub public: [u8; 32],
    pub secret: [u8; 32],
}

impl CurveKeys {
    /// Generate a fresh keypair
    pub fn generate() -> Result<Self, AgentError> {
        let pair = zmq::CurveKeyPair::new().map_err(|e| AgentError::KeyMaterial {
            reason: format!("keypair generation failed: {}", e),
        })?;

        Ok(Self {
            public: pair.public_key,
            secret: pair.secret_key,
        })
    }

    /// Decode a keypair from its Z85 form
    pub fn from_z85(public: &str, secret: &str) -> Result<Self, AgentError> {
        Ok(Self {
            public: decode_key(public)?,
            secret: decode_key(secret)?,
        })
    }

    #[must_use]
    pub fn public_z85(&self) -> String {
        encode_key(&self.public)
    }

    #[must_use]
    pub fn secret_z85(&self) -> String {
        encode_key(&self.secret)
    }
}

impl std::fmt::Debug for CurveKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveKeys")
            .field("public", &self.public_z85())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The two keypairs the agent carries
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub server: CurveKeys,
    pub client: CurveKeys,
}

impl KeyMaterial {
    /// Generate both keypairs
    pub fn generate() -> Result<Self, AgentError> {
        Ok(Self {
            server: CurveKeys::generate()?,
            client: CurveKeys::generate()?,
        })
    }

    /// Load persisted key material, generating and keeping fresh keys
    /// when any field is missing
    ///
    /// The write-back of generated keys happens at agent construction,
    /// not here, so external tooling reads them from the same place the
    /// agent does.
    pub fn load_or_generate(settings: &SettingsStore) -> Result<Self, AgentError> {
        let section = keys::SECTION;
        let stored = (
            settings.get_string(section, keys::SERVER_PUBKEY),
            settings.get_string(section, keys::SERVER_PRIVKEY),
            settings.get_string(section, keys::CLIENT_PUBKEY),
            settings.get_string(section, keys::CLIENT_PRIVKEY),
        );

        match stored {
            (Some(server_pub), Some(server_priv), Some(client_pub), Some(client_priv)) => {
                Ok(Self {
                    server: CurveKeys::from_z85(&server_pub, &server_priv)?,
                    client: CurveKeys::from_z85(&client_pub, &client_priv)?,
                })
            }
            _ => Self::generate(),
        }
    }
}

fn encode_key(key: &[u8; 32]) -> String {
    // 32 bytes is always a multiple of 4, so Z85 cannot fail here
    zmq::z85_encode(key).expect("32-byte key encodes as Z85")
}

fn decode_key(encoded: &str) -> Result<[u8; 32], AgentError> {
    let bytes = zmq::z85_decode(encoded).map_err(|e| AgentError::KeyMaterial {
        reason: format!("invalid Z85 key: {}", e),
    })?;

    bytes.try_into().map_err(|_| AgentError::KeyMaterial {
        reason: "decoded key is not 32 bytes".to_string(),
    })
}

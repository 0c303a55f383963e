//! The encryption backend. KMS and Vault based implementations are interchangeable behind
//! [`Encrypter`].

use async_trait::async_trait;

use crate::cloud::CloudError;

#[async_trait]
pub trait Encrypter: Send + Sync {
    /// The key currently present for the cluster. An empty key name means there is none.
    async fn current_state(&self, cluster_id: &str) -> Result<EncryptionKeyState, CloudError>;

    async fn desired_state(&self, cluster_id: &str) -> Result<EncryptionKeyState, CloudError>;

    async fn create_key(&self, cluster_id: &str) -> Result<(), CloudError>;

    async fn delete_key(&self, cluster_id: &str) -> Result<(), CloudError>;

    /// Encrypts with the key of [`Encrypter::current_state`]. The reconciler itself only
    /// manages the key, template renderers embedding secrets call this through
    /// [`AwsClients::encrypter`](crate::cloud::AwsClients::encrypter).
    async fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> Result<Vec<u8>, CloudError>;

    async fn decrypt(&self, key_name: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CloudError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptionKeyState {
    pub key_name: String,
}

impl EncryptionKeyState {
    pub fn is_empty(&self) -> bool {
        self.key_name.is_empty()
    }
}

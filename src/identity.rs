//! Peer identity and network addressing (spec.md §3: PeerID, MultiAddr).

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Stable cryptographic identity of a cluster member.
///
/// Rendered as the base58 encoding of an Ed25519 public key, the same way
/// libp2p-style peer identities are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "peer_id_bytes")] [u8; 32]);

mod peer_id_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        bs58::encode(bytes).into_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let decoded = bs58::decode(&s)
            .into_vec()
            .map_err(serde::de::Error::custom)?;
        decoded
            .try_into()
            .map_err(|_| serde::de::Error::custom("peer id must decode to 32 bytes"))
    }
}

impl PeerId {
    /// Derive the identity from a verifying key.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// The all-zero identity, used as a placeholder in error paths where
    /// no real peer is known.
    #[must_use]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl FromStr for PeerId {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ClusterError::ConfigError(format!("invalid peer id '{s}': {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClusterError::ConfigError(format!("peer id '{s}' is not 32 bytes")))?;
        Ok(Self(arr))
    }
}

/// An Ed25519 keypair identifying the local peer.
///
/// Wraps `ed25519_dalek::SigningKey`; the cluster orchestrator itself
/// never signs anything with it today, but carries it so a future
/// authenticated-transport layer (or a config-supplied `PrivateKey`) has
/// somewhere to live.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from 32 bytes of seed material (the
    /// `PrivateKey` configuration option in spec.md §6).
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_verifying_key(&self.signing_key.verifying_key())
    }

    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

/// A composable network address that may include a trailing [`PeerId`].
///
/// Rendered as `<socket-addr>/p2p/<peer-id>` when a peer id is present, or
/// bare `<socket-addr>` otherwise. This is a deliberately narrow address
/// scheme — enough for `split`/`join`/config parsing — not a full
/// multiaddr implementation (out of scope: spec.md only requires those two
/// operations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiAddr {
    addr: SocketAddr,
    peer_id: Option<PeerId>,
}

impl MultiAddr {
    #[must_use]
    pub fn new(addr: SocketAddr, peer_id: Option<PeerId>) -> Self {
        Self { addr, peer_id }
    }

    /// Split the address into its transport address and `PeerId`.
    ///
    /// Fails if no `PeerId` suffix is present — every membership operation
    /// that calls `split` needs both halves.
    pub fn split(&self) -> ClusterResult<(SocketAddr, PeerId)> {
        let pid = self
            .peer_id
            .ok_or_else(|| ClusterError::ConfigError(format!("multiaddr '{self}' has no peer id")))?;
        Ok((self.addr, pid))
    }

    /// Join a transport address and a `PeerId` into a composite address.
    #[must_use]
    pub fn join(addr: SocketAddr, peer_id: PeerId) -> Self {
        Self {
            addr,
            peer_id: Some(peer_id),
        }
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    /// Return a copy of this address decorated with the given peer id,
    /// replacing any existing suffix.
    #[must_use]
    pub fn with_peer_id(&self, peer_id: PeerId) -> Self {
        Self {
            addr: self.addr,
            peer_id: Some(peer_id),
        }
    }
}

impl fmt::Display for MultiAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer_id {
            Some(pid) => write!(f, "{}/p2p/{}", self.addr, pid),
            None => write!(f, "{}", self.addr),
        }
    }
}

impl FromStr for MultiAddr {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("/p2p/") {
            Some((addr_part, pid_part)) => {
                let addr: SocketAddr = addr_part
                    .parse()
                    .map_err(|e| ClusterError::ConfigError(format!("invalid address '{addr_part}': {e}")))?;
                let peer_id: PeerId = pid_part.parse()?;
                Ok(Self {
                    addr,
                    peer_id: Some(peer_id),
                })
            }
            None => {
                let addr: SocketAddr = s
                    .parse()
                    .map_err(|e| ClusterError::ConfigError(format!("invalid address '{s}': {e}")))?;
                Ok(Self {
                    addr,
                    peer_id: None,
                })
            }
        }
    }
}

//! # Token / Correlation Manager
//!
//! Tokens correlate a request with its response(s). They compare by bytes.
//!
//! [`TokenManager::generate`] hands out an [`IssuedToken`], a unique owner
//! handle. The token stays "outstanding" (and will not be issued again) until
//! the handle is dropped or passed to [`TokenManager::destroy`].

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;

use super::errors::{CaError, CaResult};

/// Longest token the wire format carries.
pub const MAX_TOKEN_LENGTH: usize = 8;

/// Attempts before generation gives up on finding an unused value.
const MAX_GENERATE_ATTEMPTS: usize = 64;

// =============================================================================
// TOKEN
// =============================================================================

/// Opaque correlation identifier, 1 to 8 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    bytes: [u8; MAX_TOKEN_LENGTH],
    len: u8,
}

impl Token {
    /// Build a token from raw bytes.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if `bytes` is empty or longer than 8.
    pub fn from_slice(bytes: &[u8]) -> CaResult<Self> {
        if bytes.is_empty() {
            return Err(CaError::invalid("token is empty"));
        }
        if bytes.len() > MAX_TOKEN_LENGTH {
            return Err(CaError::invalid(format!(
                "token length {} exceeds {MAX_TOKEN_LENGTH}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; MAX_TOKEN_LENGTH];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false for a constructed token; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// =============================================================================
// ISSUED TOKEN
// =============================================================================

/// Owner handle for a generated token.
///
/// Not `Clone`: there is exactly one owner. Dropping it releases the token.
pub struct IssuedToken {
    token: Token,
    outstanding: Arc<Mutex<HashSet<Token>>>,
}

impl IssuedToken {
    /// Copy of the token value, for building requests.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }
}

impl Deref for IssuedToken {
    type Target = Token;

    fn deref(&self) -> &Token {
        &self.token
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IssuedToken").field(&self.token).finish()
    }
}

impl Drop for IssuedToken {
    fn drop(&mut self) {
        self.outstanding.lock().remove(&self.token);
    }
}

// =============================================================================
// TOKEN MANAGER
// =============================================================================

/// Issues tokens that are unique among those still outstanding.
///
/// Cheap to clone; clones share the outstanding set.
#[derive(Clone)]
pub struct TokenManager {
    length: usize,
    outstanding: Arc<Mutex<HashSet<Token>>>,
}

impl TokenManager {
    /// Create a manager producing tokens of `length` bytes.
    ///
    /// # Errors
    ///
    /// `InvalidParam` if `length` is 0 or above 8.
    pub fn new(length: usize) -> CaResult<Self> {
        if length == 0 || length > MAX_TOKEN_LENGTH {
            return Err(CaError::invalid(format!(
                "token length must be 1..={MAX_TOKEN_LENGTH}, got {length}"
            )));
        }
        Ok(Self {
            length,
            outstanding: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Generate a fresh token.
    ///
    /// # Errors
    ///
    /// `Failed` if no unused value turned up after a bounded number of draws
    /// (only plausible with very short tokens).
    pub fn generate(&self) -> CaResult<IssuedToken> {
        let mut rng = rand::thread_rng();
        let mut buf = [0u8; MAX_TOKEN_LENGTH];
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            rng.fill_bytes(&mut buf[..self.length]);
            let token = Token::from_slice(&buf[..self.length])?;
            if self.outstanding.lock().insert(token) {
                return Ok(IssuedToken {
                    token,
                    outstanding: Arc::clone(&self.outstanding),
                });
            }
        }
        tracing::warn!(
            length = self.length,
            outstanding = self.outstanding_count(),
            "token space exhausted"
        );
        Err(CaError::failed("could not find an unused token"))
    }

    /// Release a token. Equivalent to dropping it.
    pub fn destroy(&self, token: IssuedToken) {
        drop(token);
    }

    /// Whether `token` is currently outstanding.
    #[must_use]
    pub fn is_outstanding(&self, token: &Token) -> bool {
        self.outstanding.lock().contains(token)
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.lock().len()
    }

    #[must_use]
    pub fn token_length(&self) -> usize {
        self.length
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("length", &self.length)
            .field("outstanding", &self.outstanding_count())
            .finish()
    }
}

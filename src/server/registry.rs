//! Connection Registry
//!
//! The table of live connections, keyed by the `mio::Token` each socket
//! was registered with. It is the only place connections are created and
//! destroyed, and it is owned by exactly one reactor thread.
//!
//! Tokens are handed out from a counter and never reused while the
//! registry lives, so a stale event for a closed connection can never be
//! routed to a newer one. The first tokens are reserved for the listener
//! and the shutdown waker.

use mio::Token;
use std::collections::HashMap;

/// Token of the listening socket
pub const LISTENER: Token = Token(0);

/// Token of the shutdown waker
pub const WAKER: Token = Token(1);

const FIRST_CONNECTION_TOKEN: usize = 2;

/// Live connections, keyed by token.
#[derive(Debug)]
pub struct Registry<C> {
    connections: HashMap<Token, C>,
    next_token: usize,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
        }
    }

    /// Reserves a fresh token for a connection about to be registered.
    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Adds a connection under a token obtained from [`next_token`](Self::next_token).
    pub fn insert(&mut self, token: Token, connection: C) {
        let previous = self.connections.insert(token, connection);
        debug_assert!(previous.is_none(), "token {:?} registered twice", token);
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut C> {
        self.connections.get_mut(&token)
    }

    /// Removes a connection, handing ownership back for teardown.
    pub fn remove(&mut self, token: Token) -> Option<C> {
        self.connections.remove(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.connections.contains_key(&token)
    }

    /// Tokens of every live connection.
    pub fn tokens(&self) -> Vec<Token> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

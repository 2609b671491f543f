//! Pooled server sessions
//!
//! Each pooled connection is a [`Session`]: a client plus a flag recording
//! that the session's transaction state can no longer be trusted (a failed
//! `BEGIN`, a `ROLLBACK` that did not go through, a lost connection). r2d2
//! asks [`SessionManager::has_broken`] whenever a connection is returned and
//! drops flagged sessions instead of handing them out again.

use postgres::{Client, NoTls};

/// One server session
pub(crate) struct Session {
    pub(crate) client: Client,
    poisoned: bool,
}

impl Session {
    /// Never return this session to the pool
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }
}

/// r2d2 connection manager for unix-socket sessions
#[derive(Debug)]
pub(crate) struct SessionManager {
    config: postgres::Config,
}

impl SessionManager {
    pub(crate) fn new(config: postgres::Config) -> Self {
        Self { config }
    }
}

impl r2d2::ManageConnection for SessionManager {
    type Connection = Session;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Session, postgres::Error> {
        let client = self.config.connect(NoTls)?;
        Ok(Session {
            client,
            poisoned: false,
        })
    }

    fn is_valid(&self, session: &mut Session) -> Result<(), postgres::Error> {
        session.client.simple_query("").map(|_| ())
    }

    fn has_broken(&self, session: &mut Session) -> bool {
        session.poisoned || session.client.is_closed()
    }
}

pub mod config;

pub use config::{ConnectionParams, Credentials};

use crate::core::{Result, UpgradeTestError};
use crate::interface::DatabaseClient;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ALLOWED_PACKET: usize = 16 * 1024 * 1024;
const WAIT_TIMEOUT_SECS: usize = 28_800;

/// `DatabaseClient` backed by a real MySQL connection
///
/// Every script gets its own connection: connect, run each statement,
/// commit, close. The connection is closed on the failure path too.
///
/// Sandboxes span 4.1 to 5.7, so the client has to speak the pre-5.5
/// handshake: servers that do not advertise plugin auth get a
/// `mysql_native_password` scramble, and servers older than 5.5.3 are
/// asked for `utf8` instead of `utf8mb4`. Statements are sent one by one
/// because servers that only send the 16-bit capability field never
/// advertise multi-statement support.
#[derive(Debug, Clone)]
pub struct MySqlClient {
    timeout: Duration,
}

impl MySqlClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn opts(params: &ConnectionParams) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(params.host.clone())
            .tcp_port(params.port)
            .user(Some(params.username.clone()))
            .pass(Some(params.password.clone()))
            .db_name(Some(params.database.clone()))
            // Known up front, so no settings query runs before the script.
            .prefer_socket(false)
            .max_allowed_packet(Some(MAX_ALLOWED_PACKET))
            .wait_timeout(Some(WAIT_TIMEOUT_SECS))
            .into()
    }

    async fn run(params: &ConnectionParams, sql: &str) -> Result<()> {
        let mut conn = Conn::new(Self::opts(params)).await.map_err(db_error)?;

        let result = Self::execute(&mut conn, sql).await;
        let closed = conn.disconnect().await;

        match result {
            Ok(()) => closed.map_err(db_error),
            Err(err) => {
                if let Err(close_err) = closed {
                    warn!("Closing connection to {} failed: {}", params.to_url(), close_err);
                }
                Err(err)
            }
        }
    }

    async fn execute(conn: &mut Conn, sql: &str) -> Result<()> {
        for statement in split_statements(sql) {
            debug!("Executing: {}", statement);
            conn.query_drop(statement.as_str()).await.map_err(db_error)?;
        }
        conn.query_drop("COMMIT").await.map_err(db_error)
    }
}

impl Default for MySqlClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn execute_script(&self, params: &ConnectionParams, sql: &str) -> Result<()> {
        debug!("Executing script against {}", params.to_url());

        tokio::time::timeout(self.timeout, Self::run(params, sql))
            .await
            .map_err(|_| UpgradeTestError::Timeout {
                operation: format!("SQL script on {}", params.to_url()),
                timeout: self.timeout,
            })?
    }
}

fn db_error(err: mysql_async::Error) -> UpgradeTestError {
    UpgradeTestError::Database(err.to_string())
}

/// Split a script on `;`, ignoring separators inside quotes and comments.
/// Pieces holding nothing but whitespace or comments are dropped.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        match c {
            '\'' | '"' | '`' => {
                has_code = true;
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' && c != '`' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c {
                        break;
                    }
                }
            }
            '#' => skip_line(&mut chars, &mut current),
            '-' if chars.peek() == Some(&'-') => skip_line(&mut chars, &mut current),
            '/' if chars.peek() == Some(&'*') => {
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    current.push(inner);
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
            }
            ';' => {
                current.pop();
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
            }
            c if !c.is_whitespace() => has_code = true,
            _ => {}
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}

fn skip_line(chars: &mut impl Iterator<Item = char>, current: &mut String) {
    for inner in chars {
        current.push(inner);
        if inner == '\n' {
            break;
        }
    }
}

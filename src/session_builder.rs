use std::process::Stdio;

use tokio::{
    io::{BufReader, duplex, split},
    process::Command,
};

use crate::{Handler, Session, SessionOptions, SessionResult};

impl Session {
    /// Connects two in-process sessions back to back. Useful for tests and
    /// for embedding an agent in the same process as its client.
    pub fn new_channel(
        handler0: impl Handler + Send + 'static,
        handler1: impl Handler + Send + 'static,
        options: &SessionOptions,
    ) -> (Session, Session) {
        let (d0, d1) = duplex(1024);
        let (r0, w0) = split(d0);
        let (r1, w1) = split(d1);
        let s0 = Session::new(handler0, BufReader::new(r0), w0, options);
        let s1 = Session::new(handler1, BufReader::new(r1), w1, options);
        (s0, s1)
    }

    /// [`new_channel`](Self::new_channel) with default options.
    pub fn channel(
        handler0: impl Handler + Send + 'static,
        handler1: impl Handler + Send + 'static,
    ) -> (Session, Session) {
        Self::new_channel(handler0, handler1, &SessionOptions::default())
    }

    pub fn from_stdio(handler: impl Handler + Send + 'static, options: &SessionOptions) -> Session {
        Session::new(
            handler,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            options,
        )
    }

    /// Spawns a child process and talks JSON-RPC over its stdio.
    pub fn from_command(
        handler: impl Handler + Send + 'static,
        command: &mut Command,
        options: &SessionOptions,
    ) -> SessionResult<Session> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().expect("child stdin is piped");
        let stdout = child.stdout.take().expect("child stdout is piped");
        Ok(Session::new(handler, BufReader::new(stdout), stdin, options))
    }
}

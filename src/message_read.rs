use std::{future::Future, pin::Pin};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{MessageBatch, SessionError, SessionResult};

/// Source of inbound messages.
///
/// `read` returns `None` at end of stream. A [`SessionError::Deserialize`]
/// is treated by the session as one unparsable unit (answered with
/// `-32700`), not as a dead transport; anything else ends the session.
pub trait MessageRead {
    fn read(&mut self) -> impl Future<Output = SessionResult<Option<MessageBatch>>> + Send + Sync;
    fn boxed(self) -> BoxMessageReader
    where
        Self: Sized + Send + Sync + 'static,
    {
        BoxMessageReader(Box::new(self))
    }
}

trait DynMessageRead {
    fn dyn_read<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = SessionResult<Option<MessageBatch>>> + Send + Sync + 'a>>;
}
impl<T: MessageRead> DynMessageRead for T {
    fn dyn_read<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = SessionResult<Option<MessageBatch>>> + Send + Sync + 'a>> {
        Box::pin(self.read())
    }
}

pub struct BoxMessageReader(Box<dyn DynMessageRead + Send + Sync + 'static>);
impl MessageRead for BoxMessageReader {
    fn read(&mut self) -> impl Future<Output = SessionResult<Option<MessageBatch>>> + Send + Sync {
        self.0.dyn_read()
    }
    fn boxed(self) -> BoxMessageReader
    where
        Self: Sized + Send + Sync + 'static,
    {
        self
    }
}

/// Reads line-delimited JSON messages from a buffered byte stream.
///
/// Lines are taken as raw bytes; a line that is not valid JSON (including
/// invalid UTF-8) is one unparsable unit, not a dead transport.
pub struct LineMessageReader<R> {
    reader: R,
    buf: Vec<u8>,
}
impl<R> LineMessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}
impl<R> MessageRead for LineMessageReader<R>
where
    R: AsyncBufRead + Send + Sync + Unpin,
{
    async fn read(&mut self) -> SessionResult<Option<MessageBatch>> {
        loop {
            self.buf.clear();
            let len = self.reader.read_until(b'\n', &mut self.buf).await?;
            if len == 0 {
                return Ok(None);
            }
            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return match serde_json::from_slice(line) {
                Ok(batch) => Ok(Some(batch)),
                Err(e) => Err(SessionError::deserialize(e)),
            };
        }
    }
}

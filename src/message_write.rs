use std::{future::Future, pin::Pin};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{MessageBatch, SessionError, SessionResult};

/// Sink for outbound messages.
pub trait MessageWrite {
    fn write(&mut self, batch: MessageBatch) -> impl Future<Output = SessionResult<()>> + Send + Sync;

    fn boxed(self) -> BoxMessageWriter
    where
        Self: Sized + Send + Sync + 'static,
    {
        BoxMessageWriter(Box::new(self))
    }
}

pub struct BoxMessageWriter(Box<dyn DynMessageWrite + Send + Sync + 'static>);
impl MessageWrite for BoxMessageWriter {
    async fn write(&mut self, batch: MessageBatch) -> SessionResult<()> {
        self.0.dyn_write(batch).await
    }
    fn boxed(self) -> BoxMessageWriter
    where
        Self: Sized + Send + Sync + 'static,
    {
        self
    }
}

trait DynMessageWrite {
    fn dyn_write<'a>(
        &'a mut self,
        batch: MessageBatch,
    ) -> Pin<Box<dyn Future<Output = SessionResult<()>> + Sync + Send + 'a>>;
}
impl<T: MessageWrite> DynMessageWrite for T {
    fn dyn_write<'a>(
        &'a mut self,
        batch: MessageBatch,
    ) -> Pin<Box<dyn Future<Output = SessionResult<()>> + Sync + Send + 'a>> {
        Box::pin(self.write(batch))
    }
}

/// Writes each message (or batch) as one JSON line.
pub struct LineMessageWriter<W> {
    writer: W,
}
impl<W> LineMessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}
impl<W> MessageWrite for LineMessageWriter<W>
where
    W: AsyncWrite + Send + Sync + Unpin,
{
    async fn write(&mut self, batch: MessageBatch) -> SessionResult<()> {
        let mut bytes = serde_json::to_vec(&batch).map_err(SessionError::serialize)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

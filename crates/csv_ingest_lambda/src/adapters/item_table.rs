use csv_ingest_core::error::IngestError;
use csv_ingest_core::record::Item;

/// Largest number of items the table accepts in one batch request.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Flush rounds `BatchWriter::close` allows before giving up on items the
/// table keeps handing back.
pub const MAX_CLOSE_ROUNDS: usize = 8;

/// Managed table accepting batched item writes.
pub trait ItemTable {
    /// Writes up to `BATCH_WRITE_LIMIT` items and returns those the table
    /// left unprocessed.
    fn batch_put(&self, items: &[Item]) -> Result<Vec<Item>, IngestError>;
}

/// Accumulates puts and flushes them to the table in full batches.
///
/// Unprocessed items go back into the buffer and ride along with the next
/// flush. `close` drains the buffer.
pub struct BatchWriter<'t, T: ItemTable + ?Sized> {
    table: &'t T,
    buffer: Vec<Item>,
    written: usize,
}

impl<'t, T: ItemTable + ?Sized> BatchWriter<'t, T> {
    pub fn new(table: &'t T) -> Self {
        Self {
            table,
            buffer: Vec::with_capacity(BATCH_WRITE_LIMIT),
            written: 0,
        }
    }

    pub fn put(&mut self, item: Item) -> Result<(), IngestError> {
        self.buffer.push(item);
        if self.buffer.len() >= BATCH_WRITE_LIMIT {
            self.flush()?;
        }
        Ok(())
    }

    /// Items the table has acknowledged so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn close(mut self) -> Result<usize, IngestError> {
        let mut rounds = 0usize;
        while !self.buffer.is_empty() {
            if rounds == MAX_CLOSE_ROUNDS {
                return Err(IngestError::Timeout(format!(
                    "{} items still unprocessed after {rounds} batch flushes",
                    self.buffer.len()
                )));
            }
            self.flush()?;
            rounds += 1;
        }
        Ok(self.written)
    }

    fn flush(&mut self) -> Result<(), IngestError> {
        let take = self.buffer.len().min(BATCH_WRITE_LIMIT);
        let batch: Vec<Item> = self.buffer.drain(..take).collect();
        let unprocessed = self.table.batch_put(&batch)?;
        self.written += batch.len().saturating_sub(unprocessed.len());
        self.buffer.extend(unprocessed);
        Ok(())
    }
}

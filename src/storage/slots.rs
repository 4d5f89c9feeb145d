//! Fixed-capacity slot tables of packed records in one NVS namespace.
//!
//! Slot `n` lives under key `<prefix><n>`. A slot is occupied when it holds
//! a blob of exactly the record size whose leading id field is non-empty;
//! anything else reads as free.

use crate::app::ports::StoragePort;
use crate::error::{Error, Result};

/// A record with a stable packed layout.
pub trait PackedRecord: Sized {
    const SIZE: usize;

    fn id(&self) -> &str;

    fn pack(&self) -> Vec<u8>;

    /// `None` when the blob does not describe a record.
    fn unpack(blob: &[u8]) -> Option<Self>;
}

#[derive(Debug, Clone, Copy)]
pub struct SlotTable {
    pub namespace: &'static str,
    pub prefix: &'static str,
    pub capacity: usize,
}

impl SlotTable {
    pub fn key(&self, slot: usize) -> String {
        format!("{}{}", self.prefix, slot)
    }

    fn read_slot<R: PackedRecord>(&self, nvs: &dyn StoragePort, slot: usize, buf: &mut [u8]) -> Option<R> {
        let key = self.key(slot);
        if nvs.blob_len(self.namespace, &key).ok()? != R::SIZE {
            return None;
        }
        let n = nvs.read(self.namespace, &key, buf).ok()?;
        R::unpack(&buf[..n])
    }

    /// Every occupied slot as `(slot, record)`, in slot order.
    pub fn scan<R: PackedRecord>(&self, nvs: &dyn StoragePort) -> Vec<(usize, R)> {
        let mut buf = vec![0u8; R::SIZE];
        (0..self.capacity)
            .filter_map(|slot| self.read_slot(nvs, slot, &mut buf).map(|r| (slot, r)))
            .collect()
    }

    pub fn find<R: PackedRecord>(&self, nvs: &dyn StoragePort, id: &str) -> Option<(usize, R)> {
        let mut buf = vec![0u8; R::SIZE];
        (0..self.capacity).find_map(|slot| {
            self.read_slot::<R>(nvs, slot, &mut buf)
                .filter(|r| r.id() == id)
                .map(|r| (slot, r))
        })
    }

    /// First slot not holding a record, or [`Error::NoSpace`].
    pub fn free_slot<R: PackedRecord>(&self, nvs: &dyn StoragePort) -> Result<usize> {
        let taken: Vec<usize> = self.scan::<R>(nvs).into_iter().map(|(s, _)| s).collect();
        (0..self.capacity)
            .find(|s| !taken.contains(s))
            .ok_or(Error::NoSpace)
    }

    pub fn write<R: PackedRecord>(&self, nvs: &mut dyn StoragePort, slot: usize, rec: &R) -> Result<()> {
        nvs.write(self.namespace, &self.key(slot), &rec.pack())?;
        Ok(())
    }

    pub fn erase(&self, nvs: &mut dyn StoragePort, slot: usize) -> Result<()> {
        nvs.delete(self.namespace, &self.key(slot))?;
        Ok(())
    }

    pub fn count<R: PackedRecord>(&self, nvs: &dyn StoragePort) -> usize {
        self.scan::<R>(nvs).len()
    }
}

//! Snapshots of a [`Tracer`]'s two maps, for whoever renders them.
//!
//! [`Tracer::snapshot_by_site()`] and [`Tracer::snapshot_live()`] walk a map
//! lazily and yield one row per entry. [`Report`] collects both into a value
//! that can be written out as JSON.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    alloc::{AddressRecord, CallSiteStat, RawAllocator, Tracer},
    error::ReportError,
    map::KeyedMap,
    serialize::serde_hex,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRow {
    pub site: String,
    pub allocate_count: u64,
    pub release_count: u64,
    pub outstanding: u64,
    #[serde(with = "serde_hex")]
    pub last_address: usize,
}

impl From<&CallSiteStat> for SiteRow {
    fn from(stat: &CallSiteStat) -> Self {
        Self {
            site: stat.site.clone(),
            allocate_count: stat.allocate_count,
            release_count: stat.release_count,
            outstanding: stat.outstanding(),
            last_address: stat.last_address,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRow {
    #[serde(with = "serde_hex")]
    pub address: usize,
    pub site: String,
    pub size: usize,
}

impl From<&AddressRecord> for LiveRow {
    fn from(record: &AddressRecord) -> Self {
        Self {
            address: record.address,
            site: record.site.clone(),
            size: record.size,
        }
    }
}

impl<A, S, L> Tracer<A, S, L>
where
    A: RawAllocator,
    S: KeyedMap<Value = CallSiteStat>,
    L: KeyedMap<Value = AddressRecord>,
{
    /// One row per call site, in map order
    pub fn snapshot_by_site(&self) -> impl Iterator<Item = SiteRow> + '_ {
        self.by_site().iter().map(|(_, stat)| SiteRow::from(stat))
    }

    /// One row per live allocation, in map order
    pub fn snapshot_live(&self) -> impl Iterator<Item = LiveRow> + '_ {
        self.by_address().iter().map(|(_, record)| LiveRow::from(record))
    }
}

/// Both snapshot tables, taken at one point in time
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub by_site: Vec<SiteRow>,
    pub live: Vec<LiveRow>,
}

impl Report {
    pub fn collect<A, S, L>(tracer: &Tracer<A, S, L>) -> Self
    where
        A: RawAllocator,
        S: KeyedMap<Value = CallSiteStat>,
        L: KeyedMap<Value = AddressRecord>,
    {
        Self {
            by_site: tracer.snapshot_by_site().collect(),
            live: tracer.snapshot_live().collect(),
        }
    }

    /// Sites with allocations that were never released
    pub fn leaks(&self) -> impl Iterator<Item = &SiteRow> {
        self.by_site.iter().filter(|row| row.outstanding > 0)
    }

    pub fn total_outstanding(&self) -> u64 {
        self.by_site.iter().map(|row| row.outstanding).sum()
    }

    pub fn write_json<W>(&self, writer: W) -> Result<(), ReportError>
    where
        W: Write,
    {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write_to_file<P>(&self, path: P) -> Result<(), ReportError>
    where
        P: AsRef<Path>,
    {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_json(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Read back a report written by [`Report::write_to_file()`]
    pub fn from_file<P>(path: P) -> Result<Self, ReportError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

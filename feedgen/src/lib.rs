pub mod algos;
pub mod checkpoint;
pub mod consumer;
pub mod error;
pub mod ops;
pub mod records;
pub mod storage;
pub mod storage_mem;
pub mod storage_sqlite;

pub use crate::{
    algos::{
        FeedFilter,
        KeywordFilter,
    },
    consumer::{
        IngestStats,
        Ingester,
    },
    ops::{
        classify,
        Collection,
        Operation,
    },
    storage::{
        SourceKey,
        Storage,
    },
};

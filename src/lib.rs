/*!
MistDB is an embedded, ordered key-value storage engine built on a
log-structured merge-tree, with concurrent ACID transactions under
serializable snapshot isolation.

A database is opened against a directory that it then owns:

```no_run
use mistdb::{Config, DB};

let db = DB::open("/tmp/mistdb-demo", Config::default()).unwrap();

db.update(|txn| txn.set(b"hello", b"world")).unwrap();

db.view(|txn| {
    let value = txn.get(b"hello")?;
    assert_eq!(value.as_deref(), Some(b"world".as_slice()));
    Ok(())
})
.unwrap();

db.close().unwrap();
```
*/

mod config;
mod db;
mod errors;
mod filter_policy;
mod key;
mod kway;
mod levels;
mod memtable;
mod oracle;
mod skiplist;
mod tables;
mod txn;
mod types;
mod utils;
mod wal;
mod watermark;

pub use config::Config;
pub use db::{State, DB};
pub use errors::{MistDbError, MistDbResult};
pub use txn::Txn;
pub use types::{Entry, KV};

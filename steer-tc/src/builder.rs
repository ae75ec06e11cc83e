use rustc_hash::FxHashMap;

use crate::filter::ETH_P_ALL;
use crate::handle::{class_handle, display_handle, parse_handle, parse_queue_id, ROOT_QDISC};
use crate::{ClassSpec, FilterSpec, TcBackend, TcError};

/// Priority of every queue class.
pub const CLASS_PRIO: u32 = 1;

/// Priority of every mark filter.
pub const FILTER_PRIO: u16 = 1;

/// Creates and deletes per-subscriber queues: an HTB class plus the `fw` filter that steers
/// packets marked with the queue id into it.
///
/// All operations return 0 on success and a negative errno otherwise. Nothing is rolled back
/// when only part of an operation succeeded.
#[derive(Debug)]
pub struct TcQueueBuilder<B> {
    backend: B,
    /// Interface indices by name. Interfaces are assumed to outlive the process, so entries are
    /// never evicted.
    if_index: FxHashMap<String, u32>,
}

impl<B: TcBackend> TcQueueBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, if_index: FxHashMap::default() }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Creates queue `qid` on `iface` with ceiling `ceil` and committed rate `rate`, both in
    /// bits per second. A zero rate commits the full ceiling. `parent` is the handle of the
    /// enclosing class, or the root qdisc if absent.
    ///
    /// The filter is only added once the class exists.
    pub async fn create(
        &mut self,
        iface: &str,
        qid: &str,
        ceil: u64,
        rate: u64,
        parent: Option<&str>,
    ) -> i32 {
        let err = self.create_htb(iface, qid, ceil, rate, parent).await;
        if err != 0 {
            return err;
        }
        self.create_filter(iface, qid, qid, ETH_P_ALL).await
    }

    /// Deletes queue `qid` from `iface`, filter first.
    ///
    /// The class is still deleted when the filter was already gone. The first error is
    /// returned.
    pub async fn delete(&mut self, iface: &str, qid: &str) -> i32 {
        let filter = self.del_filter(iface, qid, qid, ETH_P_ALL).await;
        if filter != 0 && !TcError::Kernel(filter).is_not_found() {
            return filter;
        }

        let class = self.del_htb(iface, qid).await;
        if filter != 0 {
            filter
        } else {
            class
        }
    }

    pub async fn create_htb(
        &mut self,
        iface: &str,
        qid: &str,
        ceil: u64,
        rate: u64,
        parent: Option<&str>,
    ) -> i32 {
        tracing::debug!(iface, qid, ceil, rate, ?parent, "creating htb class");
        let res = self.try_create_htb(iface, qid, ceil, rate, parent).await;
        Self::code("create-htb", res)
    }

    pub async fn del_htb(&mut self, iface: &str, qid: &str) -> i32 {
        let res = self.try_del_htb(iface, qid).await;
        Self::code("del-htb", res)
    }

    /// Adds a filter steering packets marked `mark` into queue `qid`. Both are hex.
    pub async fn create_filter(&mut self, iface: &str, mark: &str, qid: &str, proto: u16) -> i32 {
        let res = match self.filter_spec(iface, mark, qid, proto) {
            Ok(filter) => self.backend.add_filter(&filter).await,
            Err(e) => Err(e),
        };
        Self::code("create-filter", res)
    }

    pub async fn del_filter(&mut self, iface: &str, mark: &str, qid: &str, proto: u16) -> i32 {
        let res = match self.filter_spec(iface, mark, qid, proto) {
            Ok(filter) => self.backend.del_filter(&filter).await,
            Err(e) => Err(e),
        };
        Self::code("del-filter", res)
    }

    async fn try_create_htb(
        &mut self,
        iface: &str,
        qid: &str,
        ceil: u64,
        rate: u64,
        parent: Option<&str>,
    ) -> Result<(), TcError> {
        let interface_index = self.interface_index(iface)?;
        let class_id = class_handle(queue_id(qid)?);
        let parent = match parent {
            Some(parent) => {
                parse_handle(parent).ok_or_else(|| TcError::InvalidHandle(parent.to_string()))?
            }
            None => ROOT_QDISC,
        };

        let rate = if rate == 0 { ceil } else { rate };
        let class = ClassSpec {
            interface_index,
            class_id,
            parent,
            rate: rate / 8,
            ceil: ceil / 8,
            prio: CLASS_PRIO,
        };

        self.backend.add_class(&class).await
    }

    async fn try_del_htb(&mut self, iface: &str, qid: &str) -> Result<(), TcError> {
        let interface_index = self.interface_index(iface)?;
        let class_id = class_handle(queue_id(qid)?);
        tracing::debug!(iface, class = display_handle(class_id), "deleting htb class");
        self.backend.del_class(interface_index, class_id).await
    }

    fn filter_spec(
        &mut self,
        iface: &str,
        mark: &str,
        qid: &str,
        proto: u16,
    ) -> Result<FilterSpec, TcError> {
        Ok(FilterSpec {
            interface_index: self.interface_index(iface)?,
            parent: ROOT_QDISC,
            mark: u32::from(queue_id(mark)?),
            prio: FILTER_PRIO,
            protocol: proto,
            class_id: class_handle(queue_id(qid)?),
        })
    }

    fn interface_index(&mut self, iface: &str) -> Result<u32, TcError> {
        if let Some(index) = self.if_index.get(iface) {
            return Ok(*index);
        }

        let index = self.backend.resolve_interface_index(iface)?;
        self.if_index.insert(iface.to_string(), index);
        Ok(index)
    }

    fn code(op: &'static str, res: Result<(), TcError>) -> i32 {
        match res {
            Ok(()) => 0,
            Err(e) => {
                let code = e.code();
                tracing::error!(?e, code, "{op} failed");
                code
            }
        }
    }
}

fn queue_id(qid: &str) -> Result<u16, TcError> {
    parse_queue_id(qid).ok_or_else(|| TcError::InvalidHandle(qid.to_string()))
}

use std::{collections::BTreeMap, sync::Arc};

use nix::libc::{EBUSY, EEXIST, EINVAL, ENODEV, ENOENT};
use parking_lot::Mutex;
use steer_tc::{ClassSpec, FilterSpec, TcBackend, TcError, TcQueueBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    AddClass(u32),
    DelClass(u32),
    AddFilter(u32),
    DelFilter(u32),
}

#[derive(Debug, Default)]
struct KernelState {
    /// Classes by `(ifindex, class id)`.
    classes: BTreeMap<(u32, u32), ClassSpec>,
    /// Filters by `(ifindex, mark)`.
    filters: BTreeMap<(u32, u32), FilterSpec>,
    calls: Vec<Call>,
    resolves: usize,
    fail_classes: bool,
}

/// Behaves like the kernel for the few objects the queue builder touches.
#[derive(Debug, Clone, Default)]
struct FakeKernel {
    state: Arc<Mutex<KernelState>>,
}

impl FakeKernel {
    fn failing_classes() -> Self {
        let kernel = Self::default();
        kernel.state.lock().fail_classes = true;
        kernel
    }
}

#[async_trait::async_trait]
impl TcBackend for FakeKernel {
    async fn add_class(&mut self, class: &ClassSpec) -> Result<(), TcError> {
        let mut state = self.state.lock();
        state.calls.push(Call::AddClass(class.class_id));
        if state.fail_classes {
            return Err(TcError::Kernel(-EINVAL));
        }

        let key = (class.interface_index, class.class_id);
        if state.classes.contains_key(&key) {
            return Err(TcError::Kernel(-EEXIST));
        }
        state.classes.insert(key, *class);
        Ok(())
    }

    async fn del_class(&mut self, interface_index: u32, class_id: u32) -> Result<(), TcError> {
        let mut state = self.state.lock();
        state.calls.push(Call::DelClass(class_id));

        let in_use = state
            .filters
            .values()
            .any(|f| f.interface_index == interface_index && f.class_id == class_id);
        if in_use {
            return Err(TcError::Kernel(-EBUSY));
        }

        match state.classes.remove(&(interface_index, class_id)) {
            Some(_) => Ok(()),
            None => Err(TcError::Kernel(-ENOENT)),
        }
    }

    async fn add_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError> {
        let mut state = self.state.lock();
        state.calls.push(Call::AddFilter(filter.mark));

        let key = (filter.interface_index, filter.mark);
        if state.filters.contains_key(&key) {
            return Err(TcError::Kernel(-EEXIST));
        }
        state.filters.insert(key, *filter);
        Ok(())
    }

    async fn del_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError> {
        let mut state = self.state.lock();
        state.calls.push(Call::DelFilter(filter.mark));

        match state.filters.remove(&(filter.interface_index, filter.mark)) {
            Some(_) => Ok(()),
            None => Err(TcError::Kernel(-ENOENT)),
        }
    }

    fn resolve_interface_index(&mut self, name: &str) -> Result<u32, TcError> {
        let mut state = self.state.lock();
        state.resolves += 1;
        match name {
            "eth0" => Ok(2),
            "eth1" => Ok(3),
            _ => Err(TcError::NoSuchInterface(name.to_string())),
        }
    }
}

fn builder() -> (TcQueueBuilder<FakeKernel>, Arc<Mutex<KernelState>>) {
    let _ = tracing_subscriber::fmt::try_init();
    let kernel = FakeKernel::default();
    let state = Arc::clone(&kernel.state);
    (TcQueueBuilder::new(kernel), state)
}

#[tokio::test]
async fn create_then_delete_queue() {
    let (mut builder, state) = builder();

    assert_eq!(builder.create("eth0", "0xae", 10_000, 1_000, Some("1:fffe")).await, 0);
    {
        let state = state.lock();
        let class = state.classes[&(2, 0x1_00ae)];
        assert_eq!(class.parent, 0x1_fffe);
        assert_eq!((class.rate, class.ceil), (125, 1_250));

        let filter = state.filters[&(2, 0xae)];
        assert_eq!(filter.class_id, 0x1_00ae);
        assert_eq!(filter.prio, 1);
        assert_eq!(filter.protocol, steer_tc::ETH_P_ALL);
    }

    assert_eq!(builder.delete("eth0", "0xae").await, 0);
    let state = state.lock();
    assert!(state.classes.is_empty());
    assert!(state.filters.is_empty());
}

#[tokio::test]
async fn create_adds_class_before_filter() {
    let (mut builder, state) = builder();

    assert_eq!(builder.create("eth0", "10", 8_000, 0, None).await, 0);
    assert_eq!(state.lock().calls, [Call::AddClass(0x1_0010), Call::AddFilter(0x10)]);
}

#[tokio::test]
async fn delete_removes_filter_before_class() {
    let (mut builder, state) = builder();
    builder.create("eth0", "10", 8_000, 0, None).await;
    state.lock().calls.clear();

    assert_eq!(builder.delete("eth0", "10").await, 0);
    assert_eq!(state.lock().calls, [Call::DelFilter(0x10), Call::DelClass(0x1_0010)]);
}

#[tokio::test]
async fn class_failure_skips_the_filter() {
    let _ = tracing_subscriber::fmt::try_init();
    let kernel = FakeKernel::failing_classes();
    let state = Arc::clone(&kernel.state);
    let mut builder = TcQueueBuilder::new(kernel);

    assert_eq!(builder.create("eth0", "ae", 10_000, 1_000, None).await, -EINVAL);
    assert_eq!(state.lock().calls, [Call::AddClass(0x1_00ae)]);
}

#[tokio::test]
async fn duplicate_queue_is_refused() {
    let (mut builder, state) = builder();

    assert_eq!(builder.create("eth0", "ae", 10_000, 1_000, None).await, 0);
    assert_eq!(builder.create("eth0", "ae", 10_000, 1_000, None).await, -EEXIST);

    // The same queue id on another interface is a different queue.
    assert_eq!(builder.create("eth1", "ae", 10_000, 1_000, None).await, 0);
    assert_eq!(state.lock().classes.len(), 2);
}

#[tokio::test]
async fn deleting_unknown_queue_reports_not_found() {
    let (mut builder, state) = builder();

    assert_eq!(builder.delete("eth0", "ae").await, -ENOENT);
    // A missing filter does not stop the class delete.
    assert_eq!(state.lock().calls, [Call::DelFilter(0xae), Call::DelClass(0x1_00ae)]);
}

#[tokio::test]
async fn deleting_queue_without_filter_still_removes_class() {
    let (mut builder, state) = builder();
    assert_eq!(builder.create_htb("eth0", "ae", 10_000, 1_000, None).await, 0);

    assert_eq!(builder.delete("eth0", "ae").await, -ENOENT);
    assert!(state.lock().classes.is_empty());
}

#[tokio::test]
async fn class_in_use_cannot_be_deleted() {
    let (mut builder, state) = builder();
    builder.create("eth0", "ae", 10_000, 1_000, None).await;
    state.lock().calls.clear();

    // A class still referenced by a filter cannot go.
    assert_eq!(builder.del_htb("eth0", "ae").await, -EBUSY);
    assert_eq!(state.lock().classes.len(), 1);
    assert_eq!(builder.del_filter("eth0", "ae", "ae", steer_tc::ETH_P_ALL).await, 0);
    assert_eq!(builder.del_htb("eth0", "ae").await, 0);
}

#[tokio::test]
async fn interface_index_is_cached() {
    let (mut builder, state) = builder();

    builder.create("eth0", "1", 8_000, 0, None).await;
    builder.create("eth0", "2", 8_000, 0, None).await;
    builder.delete("eth0", "1").await;
    assert_eq!(state.lock().resolves, 1);

    builder.create("eth1", "1", 8_000, 0, None).await;
    assert_eq!(state.lock().resolves, 2);
}

#[tokio::test]
async fn unknown_interface_is_reported() {
    let (mut builder, state) = builder();

    assert_eq!(builder.create("wlan9", "ae", 10_000, 1_000, None).await, -ENODEV);
    assert_eq!(builder.delete("wlan9", "ae").await, -ENODEV);
    assert!(state.lock().calls.is_empty());

    // Failed lookups are not cached.
    builder.create("wlan9", "ae", 10_000, 1_000, None).await;
    assert_eq!(state.lock().resolves, 3);
}

#[tokio::test]
async fn malformed_queue_id_is_rejected() {
    let (mut builder, state) = builder();

    assert_eq!(builder.create("eth0", "xyz", 10_000, 1_000, None).await, -EINVAL);
    assert_eq!(builder.create("eth0", "10000", 10_000, 1_000, None).await, -EINVAL);
    assert_eq!(builder.delete("eth0", "").await, -EINVAL);
    assert!(state.lock().calls.is_empty());
}

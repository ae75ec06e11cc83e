use futures::StreamExt as _;
use nix::libc::{EINVAL, EIO, ENODEV, ENOENT};
use rtnetlink::packet_core::{NetlinkMessage, NetlinkPayload};
use rtnetlink::packet_route::RouteNetlinkMessage;
use thiserror::Error;

use crate::filter::FwFilterRequest;
use crate::handle::{display_handle, TcRequestInner};
use crate::htb::{DeleteClassRequest, HtbClassRequest};

#[derive(Debug, Error)]
pub enum TcError {
    /// The kernel refused the request. Holds the negative errno.
    #[error("Kernel error: {0}")]
    Kernel(i32),
    #[error("Interface not found: {0}")]
    NoSuchInterface(String),
    #[error("Invalid queue handle: {0}")]
    InvalidHandle(String),
    #[error("Netlink error: {0:?}")]
    Netlink(#[from] rtnetlink::Error),
}

impl TcError {
    /// The negative errno describing this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Kernel(code) => *code,
            Self::NoSuchInterface(_) => -ENODEV,
            Self::InvalidHandle(_) => -EINVAL,
            Self::Netlink(rtnetlink::Error::NetlinkError(e)) => {
                e.code.map_or(-EIO, |code| code.get())
            }
            Self::Netlink(_) => -EIO,
        }
    }

    /// Returns `true` if the object the request referred to does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code() == -ENOENT
    }
}

/// An HTB class, as handed to the kernel. Rates are in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassSpec {
    pub interface_index: u32,
    pub class_id: u32,
    pub parent: u32,
    pub rate: u64,
    pub ceil: u64,
    pub prio: u32,
}

/// A `fw` filter steering packets marked `mark` into `class_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    pub interface_index: u32,
    pub parent: u32,
    pub mark: u32,
    pub prio: u16,
    pub protocol: u16,
    pub class_id: u32,
}

/// The kernel's traffic control interface.
#[async_trait::async_trait]
pub trait TcBackend: Send {
    async fn add_class(&mut self, class: &ClassSpec) -> Result<(), TcError>;

    async fn del_class(&mut self, interface_index: u32, class_id: u32) -> Result<(), TcError>;

    async fn add_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError>;

    async fn del_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError>;

    /// Looks up the kernel index of interface `name`.
    fn resolve_interface_index(&mut self, name: &str) -> Result<u32, TcError>;
}

/// [`TcBackend`] talking rtnetlink to the kernel.
#[derive(Debug, Clone)]
pub struct NetlinkTcBackend {
    handle: rtnetlink::Handle,
}

impl NetlinkTcBackend {
    pub fn new(handle: rtnetlink::Handle) -> Self {
        Self { handle }
    }

    /// Opens a netlink socket in the current namespace and drives it on the tokio runtime.
    pub fn connect() -> std::io::Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(Self::new(handle))
    }

    async fn execute(
        &mut self,
        request: NetlinkMessage<RouteNetlinkMessage>,
    ) -> Result<(), TcError> {
        let mut res = self.handle.request(request)?;
        while let Some(res) = res.next().await {
            if let NetlinkPayload::Error(e) = res.payload {
                // A zero code is the acknowledgement.
                if let Some(code) = e.code {
                    return Err(TcError::Kernel(code.get()));
                }
            }
        }
        Ok(())
    }

    fn filter_request(filter: &FilterSpec) -> FwFilterRequest {
        FwFilterRequest::new(
            TcRequestInner::new(filter.interface_index)
                .with_parent(filter.parent)
                .with_handle(filter.mark),
            filter.class_id,
        )
        .with_prio(filter.prio)
        .with_protocol(filter.protocol)
    }
}

#[async_trait::async_trait]
impl TcBackend for NetlinkTcBackend {
    async fn add_class(&mut self, class: &ClassSpec) -> Result<(), TcError> {
        tracing::debug!(
            if_index = class.interface_index,
            class = display_handle(class.class_id),
            parent = display_handle(class.parent),
            rate = class.rate,
            ceil = class.ceil,
            "adding htb class"
        );

        let request = HtbClassRequest::new(
            TcRequestInner::new(class.interface_index)
                .with_parent(class.parent)
                .with_handle(class.class_id),
            class.rate,
            class.ceil,
        )
        .with_prio(class.prio)
        .build();

        self.execute(request).await
    }

    async fn del_class(&mut self, interface_index: u32, class_id: u32) -> Result<(), TcError> {
        tracing::debug!(
            if_index = interface_index,
            class = display_handle(class_id),
            "deleting htb class"
        );

        let request =
            DeleteClassRequest::new(TcRequestInner::new(interface_index).with_handle(class_id));
        self.execute(request.build()).await
    }

    async fn add_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError> {
        tracing::debug!(
            if_index = filter.interface_index,
            mark = filter.mark,
            class = display_handle(filter.class_id),
            "adding fw filter"
        );
        self.execute(Self::filter_request(filter).build()).await
    }

    async fn del_filter(&mut self, filter: &FilterSpec) -> Result<(), TcError> {
        tracing::debug!(
            if_index = filter.interface_index,
            mark = filter.mark,
            "deleting fw filter"
        );
        self.execute(Self::filter_request(filter).build_delete()).await
    }

    fn resolve_interface_index(&mut self, name: &str) -> Result<u32, TcError> {
        nix::net::if_::if_nametoindex(name).map_err(|e| {
            tracing::debug!(?e, name, "interface lookup failed");
            TcError::NoSuchInterface(name.to_string())
        })
    }
}

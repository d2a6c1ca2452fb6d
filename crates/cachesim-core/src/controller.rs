//! The network controller: the only path through which network state changes.
//!
//! A [`Controller`] borrows the state store and the collector proxy for the
//! duration of one event. Each operation mutates the store first and then
//! notifies the proxy, so collectors (and the strategy, through
//! [`NetworkController::view`]) always observe the post-mutation state.

use crate::collectors::CollectorProxy;
use crate::network::NetworkModel;
use cachesim_strategies::{ContentId, NetworkController, NetworkError, NetworkView, NodeId};

/// The request being served.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub time: f64,
    pub receiver: NodeId,
    pub content: ContentId,
    pub log: bool,
}

/// Mutating access to a [`NetworkModel`], reporting every side effect to
/// a [`CollectorProxy`].
#[derive(Debug)]
pub struct Controller<'a> {
    network: &'a mut NetworkModel,
    collectors: &'a mut CollectorProxy,
    session: Option<Session>,
}

impl<'a> Controller<'a> {
    pub fn new(network: &'a mut NetworkModel, collectors: &'a mut CollectorProxy) -> Self {
        Self {
            network,
            collectors,
            session: None,
        }
    }

    /// The session still open, if the strategy did not close it.
    pub fn open_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn session(&self) -> Result<Session, NetworkError> {
        self.session.ok_or(NetworkError::NoSession)
    }

    fn check_link(&self, u: NodeId, v: NodeId) -> Result<(), NetworkError> {
        self.network.link_delay(u, v).map(|_| ())
    }
}

impl NetworkController for Controller<'_> {
    fn view(&self) -> &dyn NetworkView {
        &*self.network
    }

    fn start_session(
        &mut self,
        time: f64,
        receiver: NodeId,
        content: ContentId,
        log: bool,
    ) -> Result<(), NetworkError> {
        if let Some(open) = self.session {
            return Err(NetworkError::SessionInProgress(open.content));
        }
        if !self.network.topology().contains(receiver) {
            return Err(NetworkError::NodeNotFound(receiver));
        }
        self.network.content_source(content)?;
        self.session = Some(Session {
            time,
            receiver,
            content,
            log,
        });
        self.collectors
            .start_session(&*self.network, time, receiver, content, log);
        Ok(())
    }

    fn forward_request_hop(
        &mut self,
        u: NodeId,
        v: NodeId,
        main_path: bool,
    ) -> Result<(), NetworkError> {
        self.session()?;
        self.check_link(u, v)?;
        self.collectors.request_hop(&*self.network, u, v, main_path);
        Ok(())
    }

    fn forward_content_hop(
        &mut self,
        u: NodeId,
        v: NodeId,
        main_path: bool,
    ) -> Result<(), NetworkError> {
        self.session()?;
        self.check_link(u, v)?;
        self.collectors.content_hop(&*self.network, u, v, main_path);
        Ok(())
    }

    fn get_content(&mut self, node: NodeId) -> Result<bool, NetworkError> {
        let session = self.session()?;
        if self.network.has_cache(node)? {
            if self.network.cache_get(node, session.content)? {
                self.collectors.cache_hit(node);
                return Ok(true);
            }
            self.collectors.cache_miss(node);
        }
        if self.network.content_source(session.content)? == node {
            self.collectors.server_hit(node);
            return Ok(true);
        }
        Ok(false)
    }

    fn put_content(&mut self, node: NodeId) -> Result<Option<ContentId>, NetworkError> {
        let session = self.session()?;
        let evicted = self.network.cache_put(node, session.content)?;
        if let Some(evicted) = evicted {
            self.collectors.cache_eviction(node, evicted);
        }
        Ok(evicted)
    }

    fn remove_content(&mut self, node: NodeId) -> Result<bool, NetworkError> {
        let session = self.session()?;
        self.network.cache_remove(node, session.content)
    }

    fn end_session(&mut self, success: bool) -> Result<(), NetworkError> {
        self.session.take().ok_or(NetworkError::NoSession)?;
        self.collectors.end_session(success);
        Ok(())
    }
}

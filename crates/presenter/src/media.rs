use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;
use parley_collab::{
    AttachmentId, BoxFuture, CollabResult, ImageAttachment, MessageId, MessageSearch, SearchHit,
    SearchQuery, UserId, VideoAttachment,
};

use crate::observe::Observable;
use crate::settings::MediaSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    Image(ImageAttachment),
    Video(VideoAttachment),
}

/// One gallery cell: a single image or video attachment of a searched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: AttachmentId,
    pub message_id: MessageId,
    pub author: UserId,
    pub payload: MediaPayload,
}

impl MediaItem {
    pub fn is_video(&self) -> bool {
        matches!(self.payload, MediaPayload::Video(_))
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        match &self.payload {
            MediaPayload::Image(image) => Some(image),
            MediaPayload::Video(_) => None,
        }
    }
}

/// Snapshot published to the gallery view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaWindow {
    pub items: Vec<MediaItem>,
    pub loading: bool,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Initial,
    NextPage,
}

/// Identifies one issued fetch.
///
/// `generation` changes on every `load`; `query_epoch` only when the query itself changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub generation: u64,
    pub query_epoch: u64,
    pub sequence: u64,
    pub kind: FetchKind,
}

/// Result of a fetch, ready to be applied on the owner's context.
#[derive(Debug)]
pub struct FetchCompletion {
    pub ticket: FetchTicket,
    pub result: CollabResult<Vec<SearchHit>>,
}

/// A fetch that has been registered as in flight but not yet driven.
///
/// The controller stays blocked for further pages until the completion is handed to
/// [`MediaAttachments::complete`]. An owner that drops the fetch instead must call
/// [`MediaAttachments::cancel`] with its ticket.
pub struct PendingFetch {
    ticket: FetchTicket,
    worker: BoxFuture<'static, FetchCompletion>,
}

impl PendingFetch {
    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }

    /// Drives the fetch to completion. The future is `Send`, so it may also be spawned.
    pub async fn run(self) -> FetchCompletion {
        self.worker.await
    }

    pub fn into_worker(self) -> BoxFuture<'static, FetchCompletion> {
        self.worker
    }
}

/// Append-only gallery feed over the message search API.
pub struct MediaAttachments {
    search: Arc<dyn MessageSearch>,
    settings: MediaSettings,
    query: Option<SearchQuery>,
    items: Vec<MediaItem>,
    known_ids: HashSet<AttachmentId>,
    loading: bool,
    has_more: bool,
    in_flight: Option<FetchTicket>,
    generation: u64,
    query_epoch: u64,
    sequence: u64,
    window: Observable<MediaWindow>,
}

impl MediaAttachments {
    pub fn new(search: Arc<dyn MessageSearch>, settings: MediaSettings) -> Self {
        let settings = MediaSettings {
            page_size: settings.page_size.max(1),
            ..settings
        };
        Self {
            search,
            settings,
            query: None,
            items: Vec::new(),
            known_ids: HashSet::new(),
            loading: false,
            has_more: false,
            in_flight: None,
            generation: 0,
            query_epoch: 0,
            sequence: 0,
            window: Observable::default(),
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn all_image_attachments(&self) -> Vec<&ImageAttachment> {
        self.items.iter().filter_map(MediaItem::image).collect()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<MediaWindow> {
        self.window.subscribe()
    }

    /// Starts a new feed for `query`, replacing whatever was loaded before.
    pub fn load(&mut self, query: SearchQuery) -> PendingFetch {
        self.generation += 1;
        if self.query.as_ref() != Some(&query) {
            self.query_epoch += 1;
        }
        self.items.clear();
        self.known_ids.clear();
        self.loading = true;
        self.has_more = true;
        self.query = Some(query.clone());

        tracing::info!(
            conversation_id = %query.conversation_id,
            generation = self.generation,
            "loading media attachments"
        );
        let pending = self.register(FetchKind::Initial, self.search.search(query));
        self.publish();
        pending
    }

    /// Reports that the cell at `index` became visible.
    pub fn on_item_visible(&mut self, index: usize) -> Option<PendingFetch> {
        if index.saturating_add(self.settings.prefetch_distance) < self.items.len() {
            return None;
        }
        self.load_more()
    }

    /// Requests the next page unless one is already in flight or the feed is exhausted.
    pub fn load_more(&mut self) -> Option<PendingFetch> {
        if let Some(ticket) = self.in_flight {
            tracing::debug!(sequence = ticket.sequence, "media fetch already in flight");
            return None;
        }
        if self.query.is_none() || !self.has_more {
            return None;
        }

        tracing::debug!(loaded = self.items.len(), "loading next media page");
        Some(self.register(FetchKind::NextPage, self.search.load_next_page()))
    }

    /// Releases the in-flight slot of a fetch the owner abandoned without completing.
    pub fn cancel(&mut self, ticket: FetchTicket) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        if ticket.kind == FetchKind::Initial {
            self.loading = false;
            self.publish();
        }
        tracing::debug!(sequence = ticket.sequence, "media fetch abandoned");
        true
    }

    /// Applies a finished fetch. Returns whether the window changed.
    pub fn complete(&mut self, completion: FetchCompletion) -> bool {
        let FetchCompletion { ticket, result } = completion;
        if ticket.generation != self.generation {
            return self.complete_superseded(ticket, result);
        }

        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        if ticket.kind == FetchKind::Initial {
            self.loading = false;
        }

        match result {
            Ok(hits) => {
                self.has_more = hits.len() >= self.settings.page_size;
                let added = self.merge(&hits);
                tracing::debug!(
                    hit_count = hits.len(),
                    added,
                    total = self.items.len(),
                    "merged media page"
                );
            }
            Err(error) => {
                // Leave the window as is; the next visibility event asks again.
                tracing::warn!(error = %error, kind = ?ticket.kind, "media fetch failed");
            }
        }

        self.publish();
        true
    }

    /// Late page from an earlier `load`. The search cursor already moved past it, so
    /// pages of the same query are merged; the current fetch's flags stay untouched.
    fn complete_superseded(
        &mut self,
        ticket: FetchTicket,
        result: CollabResult<Vec<SearchHit>>,
    ) -> bool {
        if ticket.query_epoch != self.query_epoch {
            tracing::debug!(
                stale_generation = ticket.generation,
                generation = self.generation,
                "dropping media page from a different query"
            );
            return false;
        }

        let Ok(hits) = result else {
            tracing::debug!(stale_generation = ticket.generation, "superseded media fetch failed");
            return false;
        };
        let added = self.merge(&hits);
        tracing::debug!(
            stale_generation = ticket.generation,
            added,
            total = self.items.len(),
            "merged late media page"
        );
        if added > 0 {
            self.publish();
        }
        added > 0
    }

    /// Convenience for single-owner callers: drive the fetch and apply it in place.
    pub async fn drive(&mut self, pending: PendingFetch) -> bool {
        let completion = pending.run().await;
        self.complete(completion)
    }

    fn register(
        &mut self,
        kind: FetchKind,
        fetch: BoxFuture<'static, CollabResult<Vec<SearchHit>>>,
    ) -> PendingFetch {
        self.sequence += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            query_epoch: self.query_epoch,
            sequence: self.sequence,
            kind,
        };
        // Marked before the future exists so a second trigger in the same turn sees it.
        self.in_flight = Some(ticket);

        PendingFetch {
            ticket,
            worker: fetch
                .map(move |result| FetchCompletion { ticket, result })
                .boxed(),
        }
    }

    fn merge(&mut self, hits: &[SearchHit]) -> usize {
        let before = self.items.len();
        for item in flatten_hits(hits) {
            if self.known_ids.insert(item.id.clone()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }

    fn publish(&mut self) {
        self.window.publish(MediaWindow {
            items: self.items.clone(),
            loading: self.loading,
            has_more: self.has_more,
        });
    }
}

/// Expands each hit into one item per image, then one per video.
pub fn flatten_hits(hits: &[SearchHit]) -> Vec<MediaItem> {
    let mut items = Vec::new();
    for hit in hits {
        items.extend(hit.images.iter().map(|image| MediaItem {
            id: image.id.clone(),
            message_id: hit.message_id.clone(),
            author: hit.author.clone(),
            payload: MediaPayload::Image(image.clone()),
        }));
        items.extend(hit.videos.iter().map(|video| MediaItem {
            id: video.id.clone(),
            message_id: hit.message_id.clone(),
            author: hit.author.clone(),
            payload: MediaPayload::Video(video.clone()),
        }));
    }
    items
}

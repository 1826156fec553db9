//! Image delivery facade.
//!
//! Two request shapes sit on top of [`PhotoLibrary::request_image`]:
//! thumbnails, where every frame is useful as it arrives, and high-quality
//! images for full-screen review, where only the final frame counts. Each
//! request is bound to a display slot; a newer request for the same slot
//! supersedes the older one and its late frames are dropped in [`poll`].
//!
//! [`poll`]: ImageDelivery::poll

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::library::{
    DeliveredImage, DeliveryMode, ImageFrame, ImageRequest, LibraryError, PhotoLibrary,
};
use crate::model::PhotoId;

/// How often `poll_timeout` looks at in-flight requests.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A display position (grid cell, detail view) that shows one image at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

/// Identifies one request; only the latest token of a slot is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Thumbnail,
    HighQuality,
}

#[derive(Debug)]
pub struct Delivery {
    pub slot: SlotId,
    pub token: RequestToken,
    pub photo_id: PhotoId,
    pub kind: ImageKind,
    pub result: Result<DeliveredImage, LibraryError>,
    /// A placeholder; a better image for the same request may follow.
    pub degraded: bool,
}

impl Delivery {
    pub fn is_terminal(&self) -> bool {
        !self.degraded
    }
}

/// A request whose frames are still arriving from the library.
struct InFlight {
    slot: SlotId,
    token: RequestToken,
    photo_id: PhotoId,
    kind: ImageKind,
    frames: Receiver<ImageFrame>,
}

impl InFlight {
    fn delivery(&self, result: Result<DeliveredImage, LibraryError>, degraded: bool) -> Delivery {
        Delivery {
            slot: self.slot,
            token: self.token,
            photo_id: self.photo_id.clone(),
            kind: self.kind,
            result,
            degraded,
        }
    }

    /// Move whatever frames arrived into `out`. Returns false once the
    /// request is finished.
    fn drain(&self, out: &mut Vec<Delivery>) -> bool {
        loop {
            match self.frames.try_recv() {
                Ok(ImageFrame { result, degraded }) => match self.kind {
                    ImageKind::Thumbnail => match result {
                        Ok(image) => out.push(self.delivery(Ok(image), degraded)),
                        Err(e) => debug!("Thumbnail frame for {} failed: {}", self.photo_id, e),
                    },
                    ImageKind::HighQuality => {
                        if !degraded {
                            out.push(self.delivery(result, false));
                            return false;
                        }
                    }
                },
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    if self.kind == ImageKind::HighQuality {
                        out.push(self.delivery(
                            Err(LibraryError::Unavailable(format!(
                                "no final image delivered for {}",
                                self.photo_id
                            ))),
                            false,
                        ));
                    }
                    return false;
                }
            }
        }
    }
}

pub struct ImageDelivery {
    library: Arc<dyn PhotoLibrary>,
    thumbnail_size: u32,
    high_quality_size: u32,
    in_flight: Vec<InFlight>,
    current: HashMap<SlotId, RequestToken>,
    next_token: u64,
}

impl ImageDelivery {
    pub fn new(library: Arc<dyn PhotoLibrary>, thumbnail_size: u32, high_quality_size: u32) -> Self {
        Self {
            library,
            thumbnail_size,
            high_quality_size,
            in_flight: Vec::new(),
            current: HashMap::new(),
            next_token: 0,
        }
    }

    /// Edge length used by [`ImageDelivery::request_grid_thumbnail`].
    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    fn issue(&mut self, slot: SlotId) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        if let Some(old) = self.current.insert(slot, token) {
            debug!("Slot {:?}: request {:?} superseded by {:?}", slot, old, token);
        }
        token
    }

    /// Progressive thumbnail: every successful frame is delivered, the
    /// degraded ones first.
    pub fn request_thumbnail(
        &mut self,
        slot: SlotId,
        photo_id: &PhotoId,
        target_size: u32,
    ) -> RequestToken {
        let request = ImageRequest {
            target_size,
            mode: DeliveryMode::Opportunistic,
            allow_network: false,
        };
        self.start(slot, photo_id, ImageKind::Thumbnail, request)
    }

    /// Thumbnail at the configured grid size.
    pub fn request_grid_thumbnail(&mut self, slot: SlotId, photo_id: &PhotoId) -> RequestToken {
        self.request_thumbnail(slot, photo_id, self.thumbnail_size)
    }

    /// Full-size image for review. Degraded frames are held back and exactly
    /// one delivery is made: the first final image, or the failure that
    /// prevented it.
    pub fn request_high_quality(&mut self, slot: SlotId, photo_id: &PhotoId) -> RequestToken {
        let request = ImageRequest {
            target_size: self.high_quality_size,
            mode: DeliveryMode::HighQuality,
            allow_network: true,
        };
        self.start(slot, photo_id, ImageKind::HighQuality, request)
    }

    fn start(
        &mut self,
        slot: SlotId,
        photo_id: &PhotoId,
        kind: ImageKind,
        request: ImageRequest,
    ) -> RequestToken {
        let token = self.issue(slot);
        let (frames_tx, frames_rx) = mpsc::channel();
        self.library.request_image(photo_id, request, frames_tx);
        self.in_flight.push(InFlight {
            slot,
            token,
            photo_id: photo_id.clone(),
            kind,
            frames: frames_rx,
        });
        token
    }

    /// Forget a slot; anything still in flight for it is dropped.
    pub fn cancel(&mut self, slot: SlotId) {
        self.current.remove(&slot);
    }

    pub fn is_current(&self, slot: SlotId, token: RequestToken) -> bool {
        self.current.get(&slot) == Some(&token)
    }

    /// Requests still waiting on the library.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Deliveries for current requests that arrived since the last poll.
    /// Superseded requests are dropped here, which also closes their channel
    /// so the library stops rendering for them.
    pub fn poll(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let current = &self.current;
        self.in_flight.retain(|request| {
            if current.get(&request.slot) != Some(&request.token) {
                debug!(
                    "Dropping stale image request for {} in slot {:?}",
                    request.photo_id, request.slot
                );
                return false;
            }
            request.drain(&mut deliveries)
        });
        deliveries
    }

    /// Wait up to `timeout` for at least one current delivery.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            let deliveries = self.poll();
            if !deliveries.is_empty() || self.in_flight.is_empty() {
                return deliveries;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return deliveries;
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }
}

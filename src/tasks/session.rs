//! Picker stage and the transitions that move a session towards a presented pair.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StereoMode;
use crate::error::{PresentationError, PresentationFailed};
use crate::events::{Eye, LoadPair, PairLoaded, StereoImagePack};
use crate::source::PickedImageRef;

pub const STEREO_CAPTION: &str = "Use a stereo viewer to see the right eye image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Picking,
    Loading,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Error,
    /// Shown beneath the presented card.
    Caption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub tone: Tone,
}

/// All UI-visible session state. Mutated only through the methods below.
#[derive(Debug, Default)]
pub struct StereoSession {
    left: Option<PickedImageRef>,
    right: Option<PickedImageRef>,
    pack: Option<Arc<StereoImagePack>>,
    loading: Option<u64>,
    error: Option<PresentationFailed>,
    presented: Option<Uuid>,
    next_request: u64,
}

impl StereoSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        if self.pack.is_some() {
            Stage::Presenting
        } else if self.loading.is_some() {
            Stage::Loading
        } else {
            Stage::Picking
        }
    }

    pub fn picked(&self, eye: Eye) -> Option<&PickedImageRef> {
        match eye {
            Eye::Left => self.left.as_ref(),
            Eye::Right => self.right.as_ref(),
        }
    }

    /// Both eyes have a selection.
    pub fn is_ready(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn error(&self) -> Option<&PresentationFailed> {
        self.error.as_ref()
    }

    pub fn pack(&self) -> Option<&Arc<StereoImagePack>> {
        self.pack.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn presented(&self) -> Option<Uuid> {
        self.presented
    }

    /// Record a selection. Ignored while a pair is being presented.
    pub fn pick(&mut self, eye: Eye, picked: PickedImageRef) -> bool {
        if self.pack.is_some() {
            debug!(%eye, "pick ignored while presenting");
            return false;
        }
        info!(%eye, image = %picked.display_name(), "eye image picked");
        *self.slot(eye) = Some(picked);
        true
    }

    pub fn clear(&mut self, eye: Eye) -> bool {
        if self.pack.is_some() {
            return false;
        }
        self.slot(eye).take().is_some()
    }

    /// Start loading when both eyes are picked and nothing is in flight.
    pub fn confirm(&mut self) -> Option<LoadPair> {
        if self.loading.is_some() || self.pack.is_some() {
            return None;
        }
        let (Some(left), Some(right)) = (self.left.clone(), self.right.clone()) else {
            return None;
        };
        self.next_request += 1;
        let request = self.next_request;
        self.loading = Some(request);
        self.error = None;
        info!(request, "loading stereo pair");
        Some(LoadPair {
            request,
            left,
            right,
        })
    }

    /// Apply a loader result. Returns `false` for results nobody is waiting for.
    pub fn on_pair_loaded(&mut self, loaded: PairLoaded) -> bool {
        if self.loading != Some(loaded.request) {
            debug!(request = loaded.request, "stale pair result dropped");
            return false;
        }
        self.loading = None;
        match loaded.result {
            Ok(pack) => {
                info!(request = loaded.request, pack = %pack.id(), "stereo pair ready");
                self.pack = Some(pack);
                self.presented = None;
            }
            Err(err) => self.fail(&err),
        }
        true
    }

    /// The presenter finished for `pack_id`.
    pub fn on_presented(&mut self, pack_id: Uuid) {
        if self.pack.as_ref().map(|pack| pack.id()) == Some(pack_id) {
            self.presented = Some(pack_id);
        }
    }

    /// The presenter failed; fall back to the picker with the error shown.
    pub fn on_presentation_failed(&mut self, err: &PresentationError) {
        self.pack = None;
        self.presented = None;
        self.fail(err);
    }

    pub fn dismiss_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    /// Leave the presenter (or abandon a load) and return to the picker.
    pub fn back(&mut self) -> bool {
        if self.pack.take().is_some() {
            self.presented = None;
            return true;
        }
        if let Some(request) = self.loading.take() {
            info!(request, "pair load abandoned");
            return true;
        }
        false
    }

    /// Text for the status overlay in the current stage.
    pub fn status(&self, mode: StereoMode) -> Status {
        if let Some(err) = &self.error {
            return Status {
                text: format!("{err}\n\nEsc to dismiss"),
                tone: Tone::Error,
            };
        }
        match self.stage() {
            Stage::Presenting => Status {
                text: format!("{STEREO_CAPTION}\n{mode} (M to change, Esc to go back)"),
                tone: Tone::Caption,
            },
            Stage::Loading => Status {
                text: "Loading stereo pair...\n\nEsc to cancel".to_string(),
                tone: Tone::Info,
            },
            Stage::Picking => {
                let mut lines: Vec<String> = [(Eye::Left, 'L'), (Eye::Right, 'R')]
                    .into_iter()
                    .map(|(eye, key)| match self.picked(eye) {
                        Some(picked) => format!("{eye} eye: {}", picked.display_name()),
                        None => format!("{eye} eye: press {key} to pick an image"),
                    })
                    .collect();
                lines.push(String::new());
                lines.push(if self.is_ready() {
                    "Press Enter to continue".to_string()
                } else {
                    "Please pick both images before continuing.".to_string()
                });
                Status {
                    text: lines.join("\n"),
                    tone: Tone::Info,
                }
            }
        }
    }

    fn fail(&mut self, err: &PresentationError) {
        warn!(error = %err, kind = ?err.kind(), "stereo presentation failed");
        self.error = Some(PresentationFailed::from(err));
    }

    fn slot(&mut self, eye: Eye) -> &mut Option<PickedImageRef> {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::events::Bitmap;

    fn picked(name: &str) -> PickedImageRef {
        PickedImageRef::new(format!("/pairs/{name}"))
    }

    fn pack() -> Arc<StereoImagePack> {
        let bitmap = Bitmap {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        Arc::new(StereoImagePack::new(bitmap.clone(), bitmap))
    }

    #[test]
    fn ready_only_with_both_eyes() {
        let mut session = StereoSession::new();
        assert!(!session.is_ready());
        session.pick(Eye::Left, picked("l.jpg"));
        assert!(!session.is_ready());
        session.pick(Eye::Right, picked("r.jpg"));
        assert!(session.is_ready());
        assert!(session.clear(Eye::Left));
        assert!(!session.is_ready());
        session.clear(Eye::Right);
        session.pick(Eye::Right, picked("r.jpg"));
        assert!(!session.is_ready());
    }

    #[test]
    fn confirm_is_single_shot_while_loading() {
        let mut session = StereoSession::new();
        assert!(session.confirm().is_none());
        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let request = session.confirm().expect("load request");
        assert_eq!(request.left, picked("l.jpg"));
        assert_eq!(request.right, picked("r.jpg"));
        assert_eq!(session.stage(), Stage::Loading);
        assert!(session.confirm().is_none());
    }

    #[test]
    fn loader_success_moves_to_presenting() {
        let mut session = StereoSession::new();
        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let request = session.confirm().unwrap().request;
        let pack = pack();
        let id = pack.id();
        assert!(session.on_pair_loaded(PairLoaded {
            request,
            result: Ok(pack),
        }));
        assert_eq!(session.stage(), Stage::Presenting);
        assert!(!session.is_loading());
        session.on_presented(id);
        assert_eq!(session.presented(), Some(id));
        assert!(!session.pick(Eye::Left, picked("other.jpg")));
    }

    #[test]
    fn loader_failure_surfaces_error_and_allows_retry() {
        let mut session = StereoSession::new();
        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let request = session.confirm().unwrap().request;
        session.on_pair_loaded(PairLoaded {
            request,
            result: Err(PresentationError::MissingImage { eye: Eye::Right }),
        });
        assert!(!session.is_loading());
        assert!(session.pack().is_none());
        assert_eq!(session.error().unwrap().kind, FailureKind::Picker);
        assert!(session.dismiss_error());
        assert!(session.error().is_none());
        assert!(session.confirm().is_some());
    }

    #[test]
    fn results_after_back_are_stale() {
        let mut session = StereoSession::new();
        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let request = session.confirm().unwrap().request;
        assert!(session.back());
        assert!(!session.on_pair_loaded(PairLoaded {
            request,
            result: Ok(pack()),
        }));
        assert_eq!(session.stage(), Stage::Picking);
    }

    #[test]
    fn status_follows_the_stage() {
        let mut session = StereoSession::new();
        let status = session.status(StereoMode::SideBySide);
        assert_eq!(status.tone, Tone::Info);
        assert!(status.text.contains("press L to pick"));
        assert!(status.text.ends_with("Please pick both images before continuing."));

        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let status = session.status(StereoMode::SideBySide);
        assert!(status.text.contains("left eye: l.jpg"));
        assert!(status.text.contains("right eye: r.jpg"));
        assert!(status.text.ends_with("Press Enter to continue"));

        let request = session.confirm().unwrap().request;
        assert!(session.status(StereoMode::SideBySide).text.starts_with("Loading"));

        session.on_pair_loaded(PairLoaded {
            request,
            result: Ok(pack()),
        });
        let status = session.status(StereoMode::Anaglyph);
        assert_eq!(status.tone, Tone::Caption);
        assert!(status.text.starts_with(STEREO_CAPTION));
        assert!(status.text.contains("anaglyph"));
    }

    #[test]
    fn errors_take_over_the_status() {
        let mut session = StereoSession::new();
        session.on_presentation_failed(&PresentationError::MissingImage { eye: Eye::Left });
        let status = session.status(StereoMode::SideBySide);
        assert_eq!(status.tone, Tone::Error);
        assert!(status.text.contains("left eye image is missing"));
        assert!(status.text.ends_with("Esc to dismiss"));
    }

    #[test]
    fn presentation_failure_returns_to_picker_with_picks() {
        let mut session = StereoSession::new();
        session.pick(Eye::Left, picked("l.jpg"));
        session.pick(Eye::Right, picked("r.jpg"));
        let request = session.confirm().unwrap().request;
        session.on_pair_loaded(PairLoaded {
            request,
            result: Ok(pack()),
        });
        session.on_presentation_failed(&PresentationError::AssetLoad {
            path: "/Root/Material".into(),
            reason: "missing".into(),
        });
        assert_eq!(session.stage(), Stage::Picking);
        assert_eq!(session.error().unwrap().kind, FailureKind::AssetLoad);
        assert!(session.is_ready());
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decode::Decoder;
use crate::error::PresentationError;
use crate::events::{Bitmap, Eye, LoadPair, PairLoaded, StereoImagePack};
use crate::source::ImageSource;

/// Resolve and decode both eyes concurrently.
///
/// The pack only exists once both eyes succeeded; the first failure wins and
/// the other eye's work is dropped.
pub async fn load_pair<S, D>(
    left: &S,
    right: &S,
    decoder: Arc<D>,
    timeout: Option<Duration>,
) -> Result<StereoImagePack, PresentationError>
where
    S: ImageSource,
    D: Decoder,
{
    let (left, right) = tokio::try_join!(
        resolve_eye(Eye::Left, left, decoder.clone(), timeout),
        resolve_eye(Eye::Right, right, decoder, timeout),
    )?;
    Ok(StereoImagePack::new(left, right))
}

async fn resolve_eye<S, D>(
    eye: Eye,
    source: &S,
    decoder: Arc<D>,
    timeout: Option<Duration>,
) -> Result<Bitmap, PresentationError>
where
    S: ImageSource,
    D: Decoder,
{
    let work = async {
        let bytes = source
            .load_bytes()
            .await
            .map_err(|source| PresentationError::Unavailable { eye, source })?
            .ok_or(PresentationError::MissingImage { eye })?;
        debug!(%eye, source = %source.label(), len = bytes.len(), "decoding eye image");
        tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|err| PresentationError::Interrupted {
                reason: format!("{eye} eye decode: {err}"),
            })?
            .map_err(|source| PresentationError::Decode { eye, source })
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| PresentationError::Timeout {
                eye,
                timeout_ms: limit.as_millis() as u64,
            })?,
        None => work.await,
    }
}

/// Serve `LoadPair` requests until cancelled or the session hangs up.
pub async fn run<D: Decoder>(
    mut load_rx: Receiver<LoadPair>,
    to_viewer: Sender<PairLoaded>,
    cancel: CancellationToken,
    decoder: Arc<D>,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut tasks: JoinSet<PairLoaded> = JoinSet::new();
    let mut requests: HashMap<tokio::task::Id, u64> = HashMap::new();

    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(LoadPair { request, left, right }) = load_rx.recv() => {
                let decoder = decoder.clone();
                let handle = tasks.spawn(async move {
                    let result = load_pair(&left, &right, decoder, timeout)
                        .await
                        .map(Arc::new);
                    PairLoaded { request, result }
                });
                requests.insert(handle.id(), request);
            }

            Some(joined) = tasks.join_next_with_id() => {
                let loaded = match joined {
                    Ok((id, loaded)) => {
                        requests.remove(&id);
                        loaded
                    }
                    Err(err) => {
                        warn!(error = %err, "pair load task failed");
                        let Some(request) = requests.remove(&err.id()) else {
                            continue;
                        };
                        PairLoaded {
                            request,
                            result: Err(PresentationError::Interrupted {
                                reason: err.to_string(),
                            }),
                        }
                    }
                };
                if to_viewer.send(loaded).await.is_err() {
                    debug!("viewer closed; stopping loader");
                    break;
                }
            }

            else => break,
        }
    }

    tasks.abort_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Bytes(Option<Vec<u8>>);

    impl ImageSource for Bytes {
        fn label(&self) -> String {
            "memory".into()
        }

        async fn load_bytes(&self) -> io::Result<Option<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    /// Decodes `[w, h, fill]` into a `w x h` bitmap of `fill`.
    #[derive(Default)]
    struct TinyDecoder {
        calls: AtomicUsize,
    }

    impl Decoder for TinyDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Bitmap, image::ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match bytes {
                [w, h, fill] => Ok(Bitmap {
                    width: *w as u32,
                    height: *h as u32,
                    pixels: vec![*fill; *w as usize * *h as usize * 4],
                }),
                _ => Err(image::ImageError::IoError(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "bad tiny image",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn keeps_eyes_in_order() {
        let decoder = Arc::new(TinyDecoder::default());
        let pack = load_pair(
            &Bytes(Some(vec![2, 1, 7])),
            &Bytes(Some(vec![1, 2, 9])),
            decoder.clone(),
            None,
        )
        .await
        .unwrap();
        assert_eq!((pack.left().width, pack.left().height), (2, 1));
        assert!(pack.left().pixels.iter().all(|&p| p == 7));
        assert_eq!((pack.right().width, pack.right().height), (1, 2));
        assert!(pack.right().pixels.iter().all(|&p| p == 9));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_right_eye_fails_whole_pair() {
        let err = load_pair(
            &Bytes(Some(vec![1, 1, 1])),
            &Bytes(None),
            Arc::new(TinyDecoder::default()),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PresentationError::MissingImage { eye: Eye::Right }));
    }

    #[tokio::test]
    async fn undecodable_left_eye_is_a_decode_error() {
        let err = load_pair(
            &Bytes(Some(vec![0xde, 0xad])),
            &Bytes(Some(vec![1, 1, 1])),
            Arc::new(TinyDecoder::default()),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PresentationError::Decode { eye: Eye::Left, .. }));
    }

    struct Stalled;

    impl ImageSource for Stalled {
        fn label(&self) -> String {
            "stalled".into()
        }

        async fn load_bytes(&self) -> io::Result<Option<Vec<u8>>> {
            std::future::pending().await
        }
    }

    struct PanickingDecoder;

    impl Decoder for PanickingDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<Bitmap, image::ImageError> {
            panic!("decoder blew up");
        }
    }

    #[tokio::test]
    async fn stalled_source_times_out() {
        let err = load_pair(
            &Stalled,
            &Stalled,
            Arc::new(TinyDecoder::default()),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PresentationError::Timeout { timeout_ms: 50, .. }
        ));
        assert_eq!(err.kind(), crate::error::FailureKind::Picker);
    }

    #[tokio::test]
    async fn decoder_panic_is_an_interruption() {
        let err = load_pair(
            &Bytes(Some(vec![1, 1, 1])),
            &Bytes(Some(vec![1, 1, 1])),
            Arc::new(PanickingDecoder),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PresentationError::Interrupted { .. }));
    }

    #[tokio::test]
    async fn run_answers_each_request_once() {
        let (load_tx, load_rx) = tokio::sync::mpsc::channel(4);
        let (loaded_tx, mut loaded_rx) = tokio::sync::mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            load_rx,
            loaded_tx,
            cancel.clone(),
            Arc::new(crate::decode::ImageDecoder),
            None,
        ));

        let dir = tempfile::tempdir().unwrap();
        let missing = crate::source::PickedImageRef::new(dir.path().join("nope.png"));
        load_tx
            .send(LoadPair {
                request: 41,
                left: missing.clone(),
                right: missing,
            })
            .await
            .unwrap();

        let loaded = loaded_rx.recv().await.expect("one result");
        assert_eq!(loaded.request, 41);
        assert!(matches!(
            loaded.result,
            Err(PresentationError::Unavailable { .. })
        ));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}

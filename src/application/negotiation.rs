//! Sample-rate negotiation against the capture hardware

use tracing::debug;

use crate::application::ports::{CaptureBackend, CaptureError, CaptureSource};
use crate::domain::audio::AudioMeta;

/// Build the candidate list: the caller's rate first, then the fixed
/// priority list without repeats.
pub fn candidate_rates(preferred: u32, fixed: &[u32]) -> Vec<u32> {
    let mut rates = Vec::with_capacity(fixed.len() + 1);
    for rate in std::iter::once(preferred).chain(fixed.iter().copied()) {
        if rate > 0 && !rates.contains(&rate) {
            rates.push(rate);
        }
    }
    rates
}

/// Open the first candidate rate the hardware accepts.
///
/// A rate is selected when the backend reports a minimum buffer size for it
/// and the device then opens successfully. Candidates are never averaged or
/// reordered; the first acceptable one wins.
pub fn open_capture<B>(
    backend: &B,
    candidates: &[u32],
    template: AudioMeta,
) -> Result<Box<dyn CaptureSource>, CaptureError>
where
    B: CaptureBackend + ?Sized,
{
    for &rate in candidates {
        let Ok(meta) = template.with_sample_rate(rate) else {
            continue;
        };
        let Some(buffer_size) = backend.min_buffer_size(&meta) else {
            debug!(rate, "sample rate rejected by hardware");
            continue;
        };
        match backend.open(meta, buffer_size) {
            Ok(source) => {
                debug!(%meta, buffer_size, "capture source opened");
                return Ok(source);
            }
            Err(CaptureError::DeviceBusy) => return Err(CaptureError::DeviceBusy),
            Err(e) => debug!(rate, error = %e, "device failed to open"),
        }
    }
    Err(CaptureError::NoCompatibleDevice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedBackend {
        sized: Vec<u32>,
        openable: Vec<u32>,
        opened: Mutex<Vec<u32>>,
    }

    struct NullSource(AudioMeta);

    impl CaptureSource for NullSource {
        fn meta(&self) -> AudioMeta {
            self.0
        }
        fn buffer_size(&self) -> usize {
            0
        }
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, CaptureError> {
            Ok(0)
        }
        fn close(&mut self) {}
    }

    impl CaptureBackend for ScriptedBackend {
        fn has_permission(&self) -> bool {
            true
        }

        fn min_buffer_size(&self, meta: &AudioMeta) -> Option<usize> {
            self.sized
                .contains(&meta.sample_rate_hz())
                .then_some(1024)
        }

        fn open(
            &self,
            meta: AudioMeta,
            _buffer_size: usize,
        ) -> Result<Box<dyn CaptureSource>, CaptureError> {
            self.opened.lock().unwrap().push(meta.sample_rate_hz());
            if self.openable.contains(&meta.sample_rate_hz()) {
                Ok(Box::new(NullSource(meta)))
            } else {
                Err(CaptureError::DeviceFailed("init failed".into()))
            }
        }
    }

    fn template() -> AudioMeta {
        AudioMeta::pcm16(44100, 1).unwrap()
    }

    #[test]
    fn candidates_put_preferred_first() {
        assert_eq!(
            candidate_rates(16000, &[44100, 22050, 16000, 11025]),
            vec![16000, 44100, 22050, 11025]
        );
        assert_eq!(
            candidate_rates(44100, &[44100, 22050]),
            vec![44100, 22050]
        );
    }

    #[test]
    fn picks_first_supported_rate() {
        let backend = ScriptedBackend {
            sized: vec![16000, 11025],
            openable: vec![16000, 11025],
            opened: Mutex::new(Vec::new()),
        };
        let source = open_capture(&backend, &[44100, 22050, 16000, 11025], template()).unwrap();
        assert_eq!(source.meta().sample_rate_hz(), 16000);
        assert_eq!(*backend.opened.lock().unwrap(), vec![16000]);
    }

    #[test]
    fn skips_rates_that_fail_to_open() {
        let backend = ScriptedBackend {
            sized: vec![44100, 22050],
            openable: vec![22050],
            opened: Mutex::new(Vec::new()),
        };
        let source = open_capture(&backend, &[44100, 22050, 16000], template()).unwrap();
        assert_eq!(source.meta().sample_rate_hz(), 22050);
        assert_eq!(*backend.opened.lock().unwrap(), vec![44100, 22050]);
    }

    #[test]
    fn no_rate_accepted() {
        let backend = ScriptedBackend {
            sized: vec![],
            openable: vec![],
            opened: Mutex::new(Vec::new()),
        };
        let result = open_capture(&backend, &[44100, 16000], template());
        assert!(matches!(result, Err(CaptureError::NoCompatibleDevice)));
    }
}

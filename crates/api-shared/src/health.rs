use crate::dto::HealthRes;

/// Health check shared by every surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// The service is healthy whenever it can answer.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "DriveFS is alive".into(),
        }
    }
}

use drm_core::SystemId;

use crate::engine::{KeyRequest, ProvisionRequest};
use crate::error::{CallbackError, DrmError};

/**
    Performs license and provisioning exchanges with remote servers.

    Both methods block and are always invoked off the control thread.
*/
pub trait LicenseCallback: Send + Sync {
    fn execute_key_request(
        &self,
        scheme: SystemId,
        request: &KeyRequest,
    ) -> Result<Vec<u8>, CallbackError>;

    fn execute_provision_request(
        &self,
        scheme: SystemId,
        request: &ProvisionRequest,
    ) -> Result<Vec<u8>, CallbackError>;
}

/**
    Receives session manager notifications. Every method is invoked on the
    bound control thread.
*/
pub trait EventListener: Send + Sync {
    /**
        Keys were loaded from a license response.
    */
    fn on_keys_loaded(&self) {}

    fn on_session_manager_error(&self, _error: &DrmError) {}

    /**
        Offline keys were restored without a network request.
    */
    fn on_keys_restored(&self) {}

    /**
        An offline license was released.
    */
    fn on_keys_removed(&self) {}
}

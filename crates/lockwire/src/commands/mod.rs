pub mod addresses;
pub mod hold;
pub mod request;

use std::sync::Arc;

use liblockwire_core::{AddressResolver, InterfaceAddressResolver, LockwireConfig};
use liblockwire_ipc::{ContentionHandler, LockCommunicator};

use crate::error::CliError;

/// Bind a communicator on the host's resolved address and start listening
async fn start_handler(
    config: &LockwireConfig,
) -> Result<(Arc<dyn AddressResolver>, ContentionHandler), CliError> {
    let resolver: Arc<dyn AddressResolver> =
        Arc::new(InterfaceAddressResolver::new(&config.network));
    let communicator = LockCommunicator::bind(resolver.clone()).await?;
    let handler = ContentionHandler::start(Arc::new(communicator), config.contention.clone());
    Ok((resolver, handler))
}

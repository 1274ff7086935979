//! Show local address resolution

use liblockwire_core::{AddressResolver, InterfaceAddressResolver, LockwireConfig};

use crate::cli::Cli;
use crate::error::CliError;
use crate::output::{output_json, print_human};

pub fn run(cli: &Cli, config: &LockwireConfig) -> Result<(), CliError> {
    let resolver = InterfaceAddressResolver::new(&config.network);
    let hostname = resolver.hostname();
    let binding = resolver.local_binding_address();
    let candidates = resolver.communication_addresses();

    output_json(
        cli,
        serde_json::json!({
            "hostname": hostname,
            "binding_address": binding.to_string(),
            "communication_addresses": candidates.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            "bind_all_interfaces": config.network.bind_all_interfaces,
            "interfaces": resolver.interfaces().iter().map(|i| serde_json::json!({
                "name": i.name,
                "address": i.address.to_string(),
                "loopback": i.is_loopback,
            })).collect::<Vec<_>>(),
        }),
    );

    print_human(cli, &format!("Hostname:        {}", hostname));
    print_human(cli, &format!("Binding address: {}", binding));
    print_human(cli, "Communication addresses:");
    for address in &candidates {
        print_human(cli, &format!("  {}", address));
    }
    Ok(())
}

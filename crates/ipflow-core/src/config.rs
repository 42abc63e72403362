use std::{default::Default, time::Duration};

#[derive(Clone, Debug)]
/// Configuration options to tune engine behavior.
pub struct Config {
    /// Default TTL stamped on unicast datagrams originated by the higher layer.
    pub time_to_live: u8,
    /// Default TTL stamped on multicast datagrams originated by the higher layer.
    pub multicast_time_to_live: u8,
    /// How long a partially reassembled datagram may wait for its remaining
    /// fragments, measured from the first fragment's arrival.
    pub fragment_timeout: Duration,
    /// Minimum interval between opportunistic sweeps of the reassembly buffer.
    pub reassembly_sweep_interval: Duration,
    /// Emit limited broadcasts on every interface when the higher layer gives
    /// no interface hint.
    pub force_broadcast: bool,
    /// Use the final destination address as the ARP target when no next-hop
    /// gateway is known on a broadcast-capable interface.
    pub use_proxy_arp: bool,
    /// Duplicate the entire original payload into every fragment instead of
    /// slicing it per fragment. Matches the legacy simulator's fragmenter;
    /// the reassembler accepts either form.
    pub copy_full_payload_in_fragments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_to_live: 32,
            multicast_time_to_live: 32,
            fragment_timeout: Duration::from_secs(60),
            reassembly_sweep_interval: Duration::from_secs(10),
            force_broadcast: false,
            use_proxy_arp: true, // matches deployed router behavior
            copy_full_payload_in_fragments: false,
        }
    }
}

//! Manage command line arguments here.
use clap::{App, Arg};
use std::net::Ipv4Addr;
use std::str::FromStr;

use mdnslib::error::MdnsResult;

/// This structure holds the command line arguments.
#[derive(Debug)]
pub struct CliOptions {
    pub service: String,
    pub interface: Ipv4Addr,
    pub timeout_secs: u64,
    pub discover: bool,
}

impl CliOptions {
    pub fn options() -> MdnsResult<Self> {
        let matches = App::new("mdns probe")
            .version("0.1")
            .about("A one-shot mDNS/DNS-SD query client")
            .arg(
                Arg::new("service")
                    .short('s')
                    .long("service")
                    .required(false)
                    .default_value("_services._dns-sd._udp.local.")
                    .long_help("Service or meta-query name to query for")
                    .takes_value(true),
            )
            .arg(
                Arg::new("interface")
                    .short('i')
                    .long("interface")
                    .required(false)
                    .default_value("0.0.0.0")
                    .long_help("IPv4 interface address to bind and join the multicast group on")
                    .takes_value(true),
            )
            .arg(
                Arg::new("timeout")
                    .short('t')
                    .long("timeout")
                    .required(false)
                    .default_value("3")
                    .long_help("Seconds to wait for replies before giving up")
                    .takes_value(true),
            )
            .arg(
                Arg::new("discover")
                    .short('d')
                    .long("discover")
                    .required(false)
                    .long_help("Send the DNS-SD service-enumeration meta-query instead of a plain query")
                    .takes_value(false),
            )
            .get_matches();

        let interface = Ipv4Addr::from_str(matches.value_of("interface").unwrap())
            .map_err(|e| mdnslib::error::MdnsError::new(&format!("invalid interface address: {}", e)))?;
        let timeout_secs = matches
            .value_of("timeout")
            .unwrap()
            .parse::<u64>()
            .map_err(|e| mdnslib::error::MdnsError::new(&format!("invalid timeout: {}", e)))?;

        Ok(CliOptions {
            service: matches.value_of("service").unwrap().to_string(),
            interface,
            timeout_secs,
            discover: matches.is_present("discover"),
        })
    }
}

//! A one-shot mDNS/DNS-SD probe
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use log::{debug, info};

use mdnslib::error::MdnsResult;
use mdnslib::record::{self, RecordType};
use mdnslib::{random_query_id, socket_bind, EntryType, RecordEvent};

mod args;
use args::CliOptions;

fn main() -> MdnsResult<()> {
    env_logger::init();

    let options = CliOptions::options()?;
    debug!("options: {:?}", &options);

    let sock = socket_bind(options.interface)?;
    debug!("socket bound: {:?}", sock.local_addr());

    let query_id = if options.discover {
        info!("sending DNS-SD discovery query");
        mdnslib::discovery_send(&sock)?;
        None
    } else {
        let query_id = random_query_id();
        info!("sending query for {} (query_id={})", &options.service, query_id);
        mdnslib::query_send(&sock, RecordType::Ptr, &options.service, query_id)?;
        Some(query_id)
    };

    let deadline = Instant::now() + Duration::from_secs(options.timeout_secs);
    let mut seen = 0u32;

    while Instant::now() < deadline {
        let mut sink = |event: RecordEvent<'_>| {
            seen += 1;
            print_event(&event);
            ControlFlow::Continue(())
        };

        let count = if options.discover {
            mdnslib::discovery_recv(&sock, &mut sink)?
        } else {
            mdnslib::query_recv(&sock, query_id, &mut sink)?
        };
        if count == 0 {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    info!("done, {} record(s) seen", seen);
    Ok(())
}

fn print_event(event: &RecordEvent<'_>) {
    if event.entry == EntryType::End {
        return;
    }
    print!("[{}] {:?} {:?} ttl={} ", event.from, event.entry, event.rtype, event.ttl);
    match event.rtype {
        RecordType::Ptr => {
            let target = record::parse_ptr(event.buffer, event.buffer.len(), event.record_offset, event.record_length);
            println!("-> {:?}", target);
        }
        RecordType::Srv => {
            let srv = record::parse_srv(event.buffer, event.buffer.len(), event.record_offset, event.record_length);
            println!("-> {:?}", srv);
        }
        RecordType::A => {
            let addr = record::parse_a(event.buffer, event.buffer.len(), event.record_offset, event.record_length);
            println!("-> {:?}", addr);
        }
        RecordType::Aaaa => {
            let addr = record::parse_aaaa(event.buffer, event.buffer.len(), event.record_offset, event.record_length);
            println!("-> {:?}", addr);
        }
        RecordType::Txt => {
            let entries = record::parse_txt(event.buffer, event.buffer.len(), event.record_offset, event.record_length);
            println!("-> {:?}", entries);
        }
        RecordType::Ignore | RecordType::Any | RecordType::Unknown(_) => println!("(unrecognized record type)"),
    }
}

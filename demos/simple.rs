//! A short walkthrough of the consensus core: elect a leader, replicate positions, commit.

use std::collections::BTreeSet;

use quorum::message::{MemberId, StatusMessage};
use quorum::node::{Config, Member};
use quorum::transport::memory::InMemoryTransport;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;

const TICK_NS: u64 = 1_000_000;

fn main() {
    env_logger::init();

    // Construct a 3 member cluster sharing one configuration
    let config = Config {
        election_timeout_ns: 10 * TICK_NS,
        heartbeat_interval_ns: 5 * TICK_NS,
        send_attempts: 3,
        log_session_id: 7,
    };
    let ids: Vec<i32> = (0..3).collect();
    let member_set: BTreeSet<MemberId> = ids.iter().map(|id| MemberId { id: *id }).collect();
    let mut members: Vec<Member<ChaChaRng>> = (ids.iter())
        .map(|id| {
            Member::new(
                MemberId { id: *id },
                member_set.clone(),
                ChaChaRng::seed_from_u64(*id as u64),
                config.clone(),
                0,
            )
        })
        .collect();
    let mut transports: Vec<InMemoryTransport> =
        ids.iter().map(|_| InMemoryTransport::new_unbounded()).collect();

    // Tick until every member has seen position 100 committed
    let mut now_ns = 0;
    let mut appended = false;
    while !(members.iter()).all(|member| member.last_commit_position() == 100) {
        now_ns += TICK_NS;
        for (idx, member) in members.iter_mut().enumerate() {
            member.on_time_event(&mut transports[idx], now_ns).unwrap();
        }

        // Once a leader exists, have the log layer report an append on every member
        if !appended && members.iter().any(|member| member.is_leader()) {
            for (idx, member) in members.iter_mut().enumerate() {
                member.log_appended(&mut transports[idx], 0, 100).unwrap();
            }
            appended = true;
            println!("log appended position 100 on every member");
        }

        // Deliver every published frame to the other members
        loop {
            let mut delivered = false;
            for from in 0..members.len() {
                let frames: Vec<_> = transports[from].drain().collect();
                for frame in frames {
                    delivered = true;
                    let message = StatusMessage::decode(&frame).unwrap();
                    println!("member {} -> all: {}", from, &message);
                    for to in 0..members.len() {
                        if to != from {
                            members[to]
                                .on_message(&mut transports[to], &message, now_ns)
                                .unwrap();
                        }
                    }
                }
            }
            if !delivered {
                break;
            }
        }
    }

    for (idx, member) in members.iter().enumerate() {
        println!(
            "member {} ({:?}) sees commit position {}",
            idx,
            member.role(),
            member.last_commit_position()
        );
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn main() {
        super::main();
    }
}

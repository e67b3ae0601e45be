#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;

use rand_core::SeedableRng;

use quorum::message::{
    AppendedPosition, CommitPosition, LeadershipTermId, MemberId, RequestVote, StatusMessage,
    Vote, VoteDecision,
};
use quorum::node::{Config, Member};
use quorum::transport::memory::InMemoryTransport;
use rand_chacha::ChaChaRng;

pub const TICK_NS: u64 = 1_000_000;

pub const CONFIG: Config = Config {
    election_timeout_ns: 10 * TICK_NS,
    heartbeat_interval_ns: 5 * TICK_NS,
    send_attempts: 3,
    log_session_id: 7,
};

const RANDOM_SEED: u64 = 0;
const MAX_TICKS: u32 = 10_000;

pub type TestMember = Member<ChaChaRng>;

pub struct TestCluster {
    pub members: Vec<TestMember>,
    pub transports: Vec<InMemoryTransport>,
    pub now_ns: u64,
    pub config: TestClusterConfig,
}

#[derive(Clone, Default)]
pub struct TestClusterConfig {
    pub drops: BTreeSet<(Option<i32>, Option<i32>)>,
    pub down: BTreeSet<i32>,
}

pub struct TestLogger;

pub struct TestLoggerContext {
    member_id: Option<i32>,
    tick: Option<u64>,
}

pub fn term(id: i64) -> LeadershipTermId {
    LeadershipTermId { id }
}

pub fn member_id(id: i32) -> MemberId {
    MemberId { id }
}

pub fn config() -> TestClusterConfig {
    TestClusterConfig::default()
}

pub fn member(id: i32, members: Vec<i32>, now_ns: u64) -> TestMember {
    TestLogger::init();
    Member::new(
        member_id(id),
        members.into_iter().map(member_id).collect(),
        ChaChaRng::seed_from_u64(RANDOM_SEED.wrapping_add(id as u64)),
        CONFIG,
        now_ns,
    )
}

pub fn drain_messages(transport: &mut InMemoryTransport) -> Vec<StatusMessage> {
    transport
        .drain()
        .map(|frame| StatusMessage::decode(&frame).expect("well-formed frame"))
        .collect()
}

pub fn request_vote(term_id: i64, base: i64, position: i64, candidate: i32) -> StatusMessage {
    StatusMessage::RequestVote(RequestVote {
        candidate_term_id: term(term_id),
        last_base_position: base,
        last_term_position: position,
        candidate_member_id: member_id(candidate),
    })
}

pub fn granted_vote(term_id: i64, candidate: i32, follower: i32) -> StatusMessage {
    StatusMessage::Vote(Vote {
        candidate_term_id: term(term_id),
        last_base_position: 0,
        last_term_position: 0,
        candidate_member_id: member_id(candidate),
        follower_member_id: member_id(follower),
        vote: VoteDecision::Granted,
    })
}

pub fn denied_vote(term_id: i64, candidate: i32, follower: i32) -> StatusMessage {
    StatusMessage::Vote(Vote {
        candidate_term_id: term(term_id),
        last_base_position: 0,
        last_term_position: 0,
        candidate_member_id: member_id(candidate),
        follower_member_id: member_id(follower),
        vote: VoteDecision::Denied,
    })
}

pub fn appended_position(position: i64, term_id: i64, follower: i32) -> StatusMessage {
    StatusMessage::AppendedPosition(AppendedPosition {
        term_position: position,
        leadership_term_id: term(term_id),
        follower_member_id: member_id(follower),
    })
}

pub fn commit_position(position: i64, term_id: i64, leader: i32) -> StatusMessage {
    StatusMessage::CommitPosition(CommitPosition {
        term_position: position,
        leadership_term_id: term(term_id),
        leader_member_id: member_id(leader),
        log_session_id: CONFIG.log_session_id,
    })
}

/// One instance of every message type carrying `term_id`, for tests that iterate message kinds.
pub fn status_messages(term_id: i64, from: i32) -> [StatusMessage; 4] {
    [
        request_vote(term_id, 0, 0, from),
        granted_vote(term_id, from, from),
        appended_position(0, term_id, from),
        commit_position(0, term_id, from),
    ]
}

//
// TestCluster impls
//

impl TestCluster {
    pub fn new(size: i32, config: TestClusterConfig) -> Self {
        TestLogger::init();
        let ids: Vec<i32> = (0..size).collect();
        Self {
            members: (ids.iter())
                .map(|id| member(*id, ids.clone(), 0))
                .collect(),
            transports: ids.iter().map(|_| InMemoryTransport::new_unbounded()).collect(),
            now_ns: 0,
            config,
        }
    }

    pub fn run_until(&mut self, mut until_fun: impl FnMut(&mut Self) -> bool) -> &mut Self {
        let mut ticks_remaining = MAX_TICKS;
        while !until_fun(self) {
            ticks_remaining = ticks_remaining
                .checked_sub(1)
                .expect("condition failed after maximum simulation length");
            self.step();
        }
        self
    }

    pub fn run_for(&mut self, ticks: u32) -> &mut Self {
        self.run_for_inspect(ticks, |_| ())
    }

    pub fn run_for_inspect(&mut self, ticks: u32, mut fun: impl FnMut(&mut Self)) -> &mut Self {
        for _ in 0..ticks {
            self.step();
            fun(self);
        }
        self
    }

    pub fn run_on_member(
        &mut self,
        member_idx: usize,
        fun: impl FnOnce(&mut TestMember, &mut InMemoryTransport, u64),
    ) -> &mut Self {
        TestLogger::set_member_id(Some(member_idx as i32));
        fun(
            &mut self.members[member_idx],
            &mut self.transports[member_idx],
            self.now_ns,
        );
        TestLogger::set_member_id(None);
        self.pump();
        self
    }

    pub fn inspect(&mut self, fun: impl FnOnce(&Self)) -> &mut Self {
        fun(self);
        self
    }

    pub fn modify(&mut self, fun: impl FnOnce(&mut Self)) -> &mut Self {
        fun(self);
        self
    }

    pub fn has_leader(&self) -> bool {
        self.members.iter().any(|member| member.is_leader())
    }

    pub fn leader_idx(&self) -> Option<usize> {
        self.members.iter().position(|member| member.is_leader())
    }

    fn step(&mut self) {
        self.now_ns += TICK_NS;
        TestLogger::set_tick(Some(self.now_ns / TICK_NS));

        for idx in 0..self.members.len() {
            let id = self.members[idx].member_id().id;
            if self.config.is_member_down(id) {
                continue;
            }
            TestLogger::set_member_id(Some(id));
            self.members[idx]
                .on_time_event(&mut self.transports[idx], self.now_ns)
                .expect("transport failed terminally");
        }
        self.pump();

        TestLogger::set_tick(None);
        TestLogger::set_member_id(None);
    }

    // Delivers every published frame to every other reachable member, repeating until the
    // status stream is quiet.
    fn pump(&mut self) {
        loop {
            let mut delivered = false;
            for from_idx in 0..self.members.len() {
                let from = self.members[from_idx].member_id().id;
                let frames = drain_messages(&mut self.transports[from_idx]);
                for message in frames {
                    delivered = true;
                    for to_idx in 0..self.members.len() {
                        let to = self.members[to_idx].member_id().id;
                        if to_idx == from_idx || self.config.should_drop(from, to) {
                            continue;
                        }
                        TestLogger::set_member_id(Some(to));
                        log::info!("<- {} {}", member_id(from), &message);
                        self.members[to_idx]
                            .on_message(&mut self.transports[to_idx], &message, self.now_ns)
                            .expect("transport failed terminally");
                    }
                }
            }
            if !delivered {
                break;
            }
        }
        TestLogger::set_member_id(None);
    }
}

//
// TestClusterConfig impls
//

impl TestClusterConfig {
    pub fn member_down(mut self, id: i32) -> Self {
        self.down.insert(id);
        self
    }

    pub fn isolate(mut self, id: i32) -> Self {
        self.drops.insert((Some(id), None));
        self.drops.insert((None, Some(id)));
        self
    }

    pub fn drop_between(mut self, from: i32, to: i32) -> Self {
        self.drops.insert((Some(from), Some(to)));
        self.drops.insert((Some(to), Some(from)));
        self
    }

    pub fn is_member_down(&self, id: i32) -> bool {
        self.down.contains(&id)
    }

    pub fn should_drop(&self, from: i32, to: i32) -> bool {
        self.drops.contains(&(Some(from), Some(to)))
            || self.drops.contains(&(Some(from), None))
            || self.drops.contains(&(None, Some(to)))
            || self.down.contains(&from)
            || self.down.contains(&to)
    }
}

//
// TestLogger impls
//

thread_local! {
    static LOGGER_CONTEXT: RefCell<TestLoggerContext> = RefCell::new(TestLoggerContext::new());
}

impl TestLogger {
    pub fn init() {
        let _ignore = log::set_logger(&Self);
        log::set_max_level(log::LevelFilter::Debug);
    }

    pub fn set_member_id(member_id: Option<i32>) {
        LOGGER_CONTEXT.with(|context| {
            context.borrow_mut().member_id = member_id;
        });
    }

    pub fn set_tick(tick: Option<u64>) {
        LOGGER_CONTEXT.with(|context| {
            context.borrow_mut().tick = tick;
        });
    }
}

impl log::Log for TestLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        LOGGER_CONTEXT.with(|context| {
            let context = context.borrow();
            if let Some(member_id) = context.member_id {
                if let Some(tick) = context.tick {
                    eprintln!("tick {:04} Member({}) {}", tick, member_id, record.args());
                } else {
                    eprintln!("tick ???? Member({}) {}", member_id, record.args());
                }
            } else {
                eprintln!("{}", record.args());
            }
        })
    }

    fn flush(&self) {}
}

//
// TestLoggerContext impls
//

impl TestLoggerContext {
    const fn new() -> Self {
        Self {
            member_id: None,
            tick: None,
        }
    }
}

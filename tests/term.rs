use common::*;
use quorum::core::Role;
use quorum::transport::memory::InMemoryTransport;

mod common;

#[test]
pub fn follower_adopts_a_greater_term() {
    for message in status_messages(1, 2).iter() {
        let mut transport = InMemoryTransport::new_unbounded();
        let mut member = member(1, vec![1, 2, 3], 0);
        assert_eq!(member.current_term(), term(0));

        member.on_message(&mut transport, message, 0).unwrap();
        assert_eq!(member.current_term(), term(1));
        assert_eq!(member.role(), Role::Follower);
    }
}

#[test]
pub fn candidate_adopts_a_greater_term() {
    for message in status_messages(2, 2).iter() {
        let mut transport = InMemoryTransport::new_unbounded();
        let mut member = member(1, vec![1, 2, 3], 0);
        member.timeout(&mut transport, 0).unwrap();
        assert_eq!(member.current_term(), term(1));
        assert_eq!(member.role(), Role::Candidate);

        member.on_message(&mut transport, message, 0).unwrap();
        assert_eq!(member.current_term(), term(2));
        assert_eq!(member.role(), Role::Follower);
    }
}

#[test]
pub fn leader_adopts_a_greater_term() {
    for message in status_messages(2, 2).iter() {
        let mut transport = InMemoryTransport::new_unbounded();
        let mut member = member(1, vec![1, 2, 3], 0);
        member.timeout(&mut transport, 0).unwrap();
        member
            .on_message(&mut transport, &granted_vote(1, 1, 2), 0)
            .unwrap();
        assert!(member.is_leader());

        member.on_message(&mut transport, message, 0).unwrap();
        assert_eq!(member.current_term(), term(2));
        assert_eq!(member.role(), Role::Follower);
    }
}

#[test]
pub fn equal_and_stale_terms_change_nothing() {
    for message in status_messages(1, 2).iter() {
        let mut transport = InMemoryTransport::new_unbounded();
        let mut member = member(1, vec![1, 2, 3], 0);
        member.timeout(&mut transport, 0).unwrap();
        member.timeout(&mut transport, 0).unwrap();
        assert_eq!(member.current_term(), term(2));

        member.on_message(&mut transport, message, 0).unwrap();
        assert_eq!(member.current_term(), term(2));
        assert_eq!(member.role(), Role::Candidate);
    }
}

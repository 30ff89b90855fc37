//! Allocation scenarios run against every store implementation.

use std::sync::Arc;

use super::common::*;
use crate::hostel::allocation::{AllocationEngine, AllocationError, Lookup};
use crate::hostel::domain::{AllocationFilter, AllocationId, Role};
use crate::hostel::store::HostelStore;

macro_rules! for_each_store {
    ($($scenario:ident),* $(,)?) => {
        mod memory_store {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let store = std::sync::Arc::new(crate::hostel::store::MemoryStore::default());
                    super::$scenario(store).await;
                }
            )*
        }

        mod sqlite_store {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let store = crate::hostel::store::SqliteStore::in_memory()
                        .await
                        .expect("sqlite store opens");
                    super::$scenario(std::sync::Arc::new(store)).await;
                }
            )*
        }

        mod sqlite_file_store {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let (_dir, store) = super::super::common::file_backed_sqlite().await;
                    super::$scenario(std::sync::Arc::new(store)).await;
                }
            )*
        }
    };
}

for_each_store!(
    capacity_limits_admission,
    active_student_cannot_be_allocated_twice,
    deallocation_is_idempotent,
    unknown_references_are_not_found,
    lookups_ignore_case_and_whitespace,
    released_students_can_move_rooms,
    removing_a_user_releases_their_place,
    removing_a_room_drops_its_allocations,
    concurrent_requests_fill_a_single_place,
    concurrent_requests_for_one_student_admit_one,
    concurrent_requests_for_separate_rooms_all_succeed,
    crowded_room_turns_latecomers_away,
    students_are_listed_by_email,
);

async fn capacity_limits_admission<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("first place");
    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 1);

    engine
        .allocate("s2@hostel.test", "A101")
        .await
        .expect("second place");
    let a101 = room(store.as_ref(), residents.a101.id).await;
    assert_eq!(a101.occupants, 2);
    assert_eq!(engine.availability(&a101), 0);

    match engine.allocate("s3@hostel.test", "A101").await {
        Err(AllocationError::RoomFull {
            room_no,
            capacity,
            occupants,
        }) => {
            assert_eq!(room_no, "A101");
            assert_eq!(capacity, 2);
            assert_eq!(occupants, 2);
        }
        other => panic!("expected room full, got {other:?}"),
    }
    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 2);
    assert!(store
        .active_allocation_for(residents.s3.id)
        .await
        .expect("lookup")
        .is_none());
    assert_consistent(store.as_ref()).await;
}

async fn active_student_cannot_be_allocated_twice<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("allocated");

    let err = engine
        .allocate("s1@hostel.test", "A102")
        .await
        .expect_err("already allocated");
    assert_eq!(err.reason(), "already_allocated");
    assert!(err.to_string().contains("deallocate first"));

    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 1);
    assert_eq!(room(store.as_ref(), residents.a102.id).await.occupants, 0);
    assert_eq!(
        store
            .allocations(AllocationFilter::All)
            .await
            .expect("listed")
            .len(),
        1
    );
    assert_consistent(store.as_ref()).await;
}

async fn deallocation_is_idempotent<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let first = engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("allocated");
    engine
        .allocate("s2@hostel.test", "A101")
        .await
        .expect("allocated");

    let outcome = engine.deallocate(first.id).await.expect("released");
    assert!(outcome.released);
    assert!(!outcome.allocation.active);
    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 1);

    let repeat = engine.deallocate(first.id).await.expect("no-op succeeds");
    assert!(!repeat.released);
    assert!(!repeat.allocation.active);
    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 1);
    assert_consistent(store.as_ref()).await;
}

async fn unknown_references_are_not_found<S: HostelStore + 'static>(store: Arc<S>) {
    residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let err = engine
        .allocate("nobody@hostel.test", "A101")
        .await
        .expect_err("unknown student");
    assert!(matches!(err, AllocationError::NotFound(Lookup::Student(_))));

    let err = engine
        .allocate("warden@hostel.test", "A101")
        .await
        .expect_err("wardens are not students");
    assert_eq!(err.reason(), "student_not_found");

    let err = engine
        .allocate("s1@hostel.test", "Z999")
        .await
        .expect_err("unknown room");
    assert_eq!(err.reason(), "room_not_found");

    let err = engine
        .deallocate(AllocationId(9_999))
        .await
        .expect_err("unknown allocation");
    assert_eq!(err.reason(), "allocation_not_found");
    assert_consistent(store.as_ref()).await;
}

async fn lookups_ignore_case_and_whitespace<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let allocation = engine
        .allocate("  S1@Hostel.Test ", " a101")
        .await
        .expect("normalized lookup");
    assert_eq!(allocation.student_id, residents.s1.id);
    assert_eq!(allocation.room_id, residents.a101.id);
}

async fn released_students_can_move_rooms<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let first = engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("allocated");
    engine.deallocate(first.id).await.expect("released");
    let second = engine
        .allocate("s1@hostel.test", "A102")
        .await
        .expect("moved");

    let active = engine
        .allocations(AllocationFilter::Active)
        .await
        .expect("listed");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].room_no, "A102");
    assert_eq!(active[0].student_email, "s1@hostel.test");

    let inactive = engine
        .allocations(AllocationFilter::Inactive)
        .await
        .expect("listed");
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].allocation.id, first.id);

    let all = engine
        .allocations(AllocationFilter::All)
        .await
        .expect("listed");
    assert_eq!(all[0].allocation.id, second.id, "newest first");

    let current = engine
        .current_allocation(residents.s1.id)
        .await
        .expect("lookup")
        .expect("active allocation");
    assert_eq!(current.allocation.id, second.id);
    assert_consistent(store.as_ref()).await;
}

async fn removing_a_user_releases_their_place<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("allocated");
    engine
        .allocate("s2@hostel.test", "A101")
        .await
        .expect("allocated");
    complaint_from(store.as_ref(), &residents.s1).await;

    let report = store.remove_user(residents.s1.id).await.expect("removed");
    assert_eq!(report.allocations_removed, 1);
    assert_eq!(report.active_allocations_ended, 1);
    assert_eq!(report.complaints_removed, 1);

    assert!(store.user(residents.s1.id).await.expect("lookup").is_none());
    assert_eq!(room(store.as_ref(), residents.a101.id).await.occupants, 1);
    assert!(store.complaints(None).await.expect("listed").is_empty());

    engine
        .allocate("s3@hostel.test", "A101")
        .await
        .expect("freed place is reusable");
    assert_consistent(store.as_ref()).await;
}

async fn removing_a_room_drops_its_allocations<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let first = engine
        .allocate("s1@hostel.test", "A101")
        .await
        .expect("allocated");
    engine.deallocate(first.id).await.expect("released");
    engine
        .allocate("s2@hostel.test", "A101")
        .await
        .expect("allocated");

    let report = store.remove_room(residents.a101.id).await.expect("removed");
    assert_eq!(report.allocations_removed, 2);
    assert_eq!(report.active_allocations_ended, 1);

    assert!(store.room(residents.a101.id).await.expect("lookup").is_none());
    assert!(engine
        .allocations(AllocationFilter::All)
        .await
        .expect("listed")
        .is_empty());

    engine
        .allocate("s2@hostel.test", "A102")
        .await
        .expect("student is free again");
    assert_consistent(store.as_ref()).await;
}

async fn concurrent_requests_fill_a_single_place<S: HostelStore + 'static>(store: Arc<S>) {
    let residents = residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let handles: Vec<_> = ["s1@hostel.test", "s2@hostel.test", "s3@hostel.test"]
        .into_iter()
        .map(|email| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.allocate(email, "A102").await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.expect("task joins") {
            Ok(_) => admitted += 1,
            Err(err) => assert_eq!(err.reason(), "room_full"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(room(store.as_ref(), residents.a102.id).await.occupants, 1);
    assert_consistent(store.as_ref()).await;
}

async fn concurrent_requests_for_one_student_admit_one<S: HostelStore + 'static>(store: Arc<S>) {
    residents(store.as_ref()).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let handles: Vec<_> = ["A101", "A102"]
        .into_iter()
        .map(|room_no| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.allocate("s1@hostel.test", room_no).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.expect("task joins") {
            Ok(_) => admitted += 1,
            Err(err) => assert_eq!(err.reason(), "already_allocated"),
        }
    }

    assert_eq!(admitted, 1);
    assert_consistent(store.as_ref()).await;
}

async fn concurrent_requests_for_separate_rooms_all_succeed<S: HostelStore + 'static>(
    store: Arc<S>,
) {
    for n in 0..20 {
        insert_user(store.as_ref(), &format!("solo{n}@hostel.test"), Role::Student).await;
        insert_room(store.as_ref(), &format!("S{n:03}"), 1).await;
    }
    let engine = AllocationEngine::new(Arc::clone(&store));

    let handles: Vec<_> = (0..20)
        .map(|n| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .allocate(&format!("solo{n}@hostel.test"), &format!("S{n:03}"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        if let Err(err) = handle.await.expect("task joins") {
            panic!("independent allocation failed: {} ({err})", err.reason());
        }
    }

    let active = store
        .allocations(AllocationFilter::Active)
        .await
        .expect("allocations listed");
    assert_eq!(active.len(), 20);
    assert_consistent(store.as_ref()).await;
}

async fn crowded_room_turns_latecomers_away<S: HostelStore + 'static>(store: Arc<S>) {
    for n in 0..10 {
        insert_user(store.as_ref(), &format!("rush{n}@hostel.test"), Role::Student).await;
    }
    let single = insert_room(store.as_ref(), "B201", 1).await;
    let engine = AllocationEngine::new(Arc::clone(&store));

    let handles: Vec<_> = (0..10)
        .map(|n| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.allocate(&format!("rush{n}@hostel.test"), "B201").await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.expect("task joins") {
            Ok(_) => admitted += 1,
            Err(err) => assert_eq!(err.reason(), "room_full", "unexpected failure: {err}"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(room(store.as_ref(), single.id).await.occupants, 1);
    assert_consistent(store.as_ref()).await;
}

async fn students_are_listed_by_email<S: HostelStore + 'static>(store: Arc<S>) {
    insert_user(store.as_ref(), "zoe@hostel.test", Role::Student).await;
    insert_user(store.as_ref(), "amir@hostel.test", Role::Student).await;
    insert_user(store.as_ref(), "mona@hostel.test", Role::Warden).await;
    insert_user(store.as_ref(), "kai@hostel.test", Role::Student).await;

    let emails: Vec<String> = store
        .users_with_role(Role::Student)
        .await
        .expect("students listed")
        .into_iter()
        .map(|user| user.email)
        .collect();
    assert_eq!(
        emails,
        ["amir@hostel.test", "kai@hostel.test", "zoe@hostel.test"]
    );
}

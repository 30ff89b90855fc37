use clap::Args;
use hostel_desk::config::{AuthConfig, SeedConfig};
use hostel_desk::error::AppError;
use hostel_desk::hostel::{
    AllocationEngine, AllocationFilter, AllocationId, HostelError, HostelService, HostelStore,
    MemoryStore, Role,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the final allocation listing as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::default());
    let service = HostelService::new(
        Arc::clone(&store),
        &AuthConfig {
            token_secret: "demo".to_string(),
            token_ttl_minutes: 5,
        },
    );

    println!("Hostel allocation demo (in-memory store)");
    service
        .seed(&SeedConfig {
            admin_email: "admin@hostel.local".to_string(),
            admin_password: "adminpass".to_string(),
        })
        .await?;
    for (name, email) in [
        ("Student One", "s1@hostel.local"),
        ("Student Two", "s2@hostel.local"),
        ("Student Three", "s3@hostel.local"),
    ] {
        service
            .accounts()
            .register(name, email, "studentpass", Role::Student)
            .await
            .map_err(HostelError::from)?;
    }
    print_rooms(store.as_ref()).await?;

    let engine = service.engine();
    println!("\nFilling A101");
    let first = attempt(engine, "s1@hostel.local", "A101").await;
    attempt(engine, "s2@hostel.local", "A101").await;
    attempt(engine, "s3@hostel.local", "A101").await;

    println!("\nMoving s1 without releasing the current place");
    attempt(engine, "s1@hostel.local", "A102").await;

    if let Some(allocation_id) = first {
        println!("\nReleasing s1 twice");
        for _ in 0..2 {
            match engine.deallocate(allocation_id).await {
                Ok(outcome) if outcome.released => {
                    println!("- deallocated {allocation_id}: place released")
                }
                Ok(_) => {
                    println!("- deallocated {allocation_id}: already inactive, nothing changed")
                }
                Err(err) => println!("- deallocate {allocation_id} failed: {err}"),
            }
        }
    }

    println!();
    print_rooms(store.as_ref()).await?;

    if args.json {
        let allocations = engine.allocations(AllocationFilter::All).await?;
        match serde_json::to_string_pretty(&allocations) {
            Ok(json) => println!("\nAllocations:\n{json}"),
            Err(err) => println!("\nAllocations unavailable: {err}"),
        }
    }

    Ok(())
}

async fn attempt<S>(
    engine: &AllocationEngine<S>,
    email: &str,
    room_no: &str,
) -> Option<AllocationId>
where
    S: HostelStore,
{
    match engine.allocate(email, room_no).await {
        Ok(allocation) => {
            println!("- {email} -> {room_no}: allocated ({})", allocation.id);
            Some(allocation.id)
        }
        Err(err) => {
            println!("- {email} -> {room_no}: refused [{}] {err}", err.reason());
            None
        }
    }
}

async fn print_rooms<S: HostelStore>(store: &S) -> Result<(), AppError> {
    println!("Rooms:");
    for room in store.rooms().await? {
        println!(
            "  {:<6} {}/{} occupied, {} free",
            room.room_no,
            room.occupants,
            room.capacity,
            room.availability()
        );
    }
    Ok(())
}

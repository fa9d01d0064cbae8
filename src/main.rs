use std::sync::Arc;

use tracing::info;

use aula::auth::{Credentials, Role, StaticCredentials};
use aula::codec::{Codec, JsonCodec};
use aula::engine::{Engine, EngineError};
use aula::model::{Ms, NewRoom, RoomStatus, SearchCriteria, Span, features};
use aula::store::JsonStore;

const H: Ms = 3_600_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let data_dir = std::env::var("AULA_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let pass_dir = std::env::var("AULA_PASS_DIR").unwrap_or_else(|_| "./data/passes".into());
    std::fs::create_dir_all(&data_dir)?;

    let store = Arc::new(JsonStore::new(&data_dir));
    let codec = Arc::new(JsonCodec::new(&pass_dir));
    let engine = Engine::open(store, codec.clone()).await?;

    info!("aula reservation engine ready");
    info!("  data_dir: {data_dir}");
    info!("  pass_dir: {pass_dir}");

    seed_rooms(&engine).await?;
    walkthrough(&engine, codec.as_ref()).await?;

    info!("aula demo finished");
    Ok(())
}

/// Registers the demo floor plan on first start. A non-empty store wins.
async fn seed_rooms(engine: &Engine) -> Result<(), EngineError> {
    if !engine.list_rooms().await.is_empty() {
        return Ok(());
    }
    for (name, capacity, feats) in [
        ("A101", 30, vec![features::PROJECTOR, features::DIGITAL_BOARD, features::ACCESSIBLE]),
        ("B202", 20, vec![features::PROJECTOR, features::ACCESSIBLE]),
        ("C303", 40, vec![features::PROJECTOR, features::DIGITAL_BOARD]),
        ("D404", 25, vec![features::DIGITAL_BOARD, features::ACCESSIBLE]),
    ] {
        engine
            .add_room(NewRoom {
                name: name.into(),
                capacity,
                location: None,
                features: feats.into_iter().map(str::to_string).collect(),
                status: RoomStatus::Available,
            })
            .await?;
    }
    info!("seeded 4 demo rooms");
    Ok(())
}

/// One booking day end to end: log in, search, reserve, show the pass,
/// let the admin cancel, and print usage.
async fn walkthrough(engine: &Engine, codec: &JsonCodec) -> Result<(), Box<dyn std::error::Error>> {
    let password = std::env::var("AULA_DEMO_PASSWORD").unwrap_or_else(|_| "123456".into());
    let directory = StaticCredentials::new()
        .with_account("teacher@test.edu", &password, Role::Teacher)
        .with_account("admin@test.edu", &password, Role::Admin);

    let teacher = directory
        .verify("teacher@test.edu", &password)
        .await
        .ok_or("demo teacher account failed to verify")?;
    let admin = directory
        .verify("admin@test.edu", &password)
        .await
        .ok_or("demo admin account failed to verify")?;

    // Tomorrow at this hour, for two hours.
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis() as Ms;
    let start = now - now % H + 24 * H;
    let window = Span::new(start, start + 2 * H);

    let mut criteria = SearchCriteria {
        min_capacity: 25,
        ..Default::default()
    };
    criteria.features.insert(features::PROJECTOR.into());
    let free = engine.search(&criteria, window).await?;
    info!(hits = free.len(), "projector rooms with 25+ seats free tomorrow");
    for room in &free {
        info!("  {} {} ({} seats)", room.id, room.name, room.capacity);
    }

    let Some(room) = free.first() else {
        info!("nothing free in that window, showing statistics only");
        print_report(engine).await;
        return Ok(());
    };

    let lecture = match engine.reserve(room.id, teacher.email.clone(), window).await {
        Ok(r) => r,
        Err(EngineError::Conflict(source)) => {
            info!("window already taken ({source:?}), state in the data dir is from an earlier run");
            print_report(engine).await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "reserved {} in {} for [{} .. {})",
        lecture.id, room.name, lecture.span.start, lecture.span.end
    );

    let bytes = codec.encode(&lecture, room).await?;
    let pass = codec.decode(&bytes).await?;
    info!(
        "pass {} admits {} to {}",
        pass.reservation_id, pass.owner, pass.room_name
    );

    // A second booking, cancelled by the admin on the teacher's behalf.
    let evening = Span::new(start + 8 * H, start + 9 * H);
    let seminar = engine
        .reserve(room.id, teacher.email.clone(), evening)
        .await?;
    engine
        .cancel(seminar.id, &admin.email, admin.role.is_admin())
        .await?;
    info!("admin cancelled {}", seminar.id);

    let mine = engine.list_for_owner(&teacher.email);
    info!(reservations = mine.len(), "booking history for {}", teacher.email);

    print_report(engine).await;
    Ok(())
}

async fn print_report(engine: &Engine) {
    let report = engine.usage_statistics().await;
    info!(
        total = report.total_reservations,
        active = report.active_reservations,
        "usage statistics"
    );
    for usage in &report.rooms {
        info!("  {} {}: {} active", usage.room_id, usage.name, usage.active);
    }
}

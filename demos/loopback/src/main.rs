use std::time::Duration;

use parley::prelude::*;

// ---------------------------------------------------------------------------
// Scenario catalog
// ---------------------------------------------------------------------------

fn catalog() -> ScenarioTable {
    ScenarioTable::new()
        .with_chapter(ChapterEntry::solo(ChapterId(0)))
        .with_chapter(ChapterEntry::networked(
            ChapterId(1),
            &[RaceId(100), RaceId(101)],
            &[RaceId(200), RaceId(201)],
        ))
        .with_chapter(ChapterEntry::networked(
            ChapterId(2),
            &[RaceId(100), RaceId(102)],
            &[RaceId(200), RaceId(202)],
        ))
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Logs what a setup screen would redraw.
struct Screen {
    name: &'static str,
}

impl SetupObserver for Screen {
    fn on_peer_arrived(&mut self) {
        tracing::info!(screen = self.name, "opponent arrived");
    }

    fn on_lag_sample_recorded(&mut self, lag: &LagSnapshot) {
        tracing::debug!(
            screen = self.name,
            sample = %lag.sample,
            latest = lag.latest,
            mean = lag.mean,
            recommended = lag.recommended_latency,
            "lag"
        );
    }

    fn on_setting_changed(&mut self, setting: Setting, origin: Origin) {
        if origin == Origin::Remote {
            tracing::info!(screen = self.name, ?setting, "opponent changed a setting");
        }
    }

    fn on_chat_changed(&mut self, side: Side, text: &str) {
        if side == Side::Opponent {
            tracing::info!(screen = self.name, text, "chat");
        }
    }

    fn on_connection_problem(&mut self, desyncs: u32) {
        tracing::warn!(screen = self.name, desyncs, "connection trouble");
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

fn start(
    name: &'static str,
    conn: MemoryConnection,
    initial: InitialSettings,
) -> (
    tokio::task::JoinHandle<Result<Session<MemoryConnection, ScenarioTable>, ParleyError>>,
    SetupHandle,
) {
    let driver = SetupDriver::builder()
        .observer(Screen { name })
        .build();
    let handle = driver.handle();
    let task = tokio::spawn(driver.run(conn, catalog(), SystemClock::new(), initial));
    (task, handle)
}

fn report(name: &str, session: &Session<MemoryConnection, ScenarioTable>) {
    match session.outcome() {
        Some(SessionOutcome::Success(settings)) => {
            eprintln!(
                "{name}: starting level {} as race {} against race {}, latency {} ticks, mean lag {} ticks",
                settings.level,
                settings.my_race.0,
                settings.opponent_race.0,
                settings.latency.ticks(),
                session.lag().mean(),
            );
        }
        Some(outcome) => eprintln!("{name}: setup ended with {outcome:?}"),
        None => eprintln!("{name}: setup still running"),
    }
    eprintln!("{name}: link {:?}", session.connection().stats());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    parley::init_tracing();

    let link = LinkConfig {
        loss_rate: 0.2,
        duplicate_rate: 0.05,
        seed: Some(42),
    };
    let (host_link, client_link) = MemoryConnection::pair(link);

    let (host_task, host) = start(
        "host",
        host_link,
        InitialSettings {
            level: ChapterId(1),
            race: RaceId(100),
            ..InitialSettings::default()
        },
    );
    let (client_task, client) = start(
        "client",
        client_link,
        InitialSettings {
            level: ChapterId(1),
            race: RaceId(201),
            ..InitialSettings::default()
        },
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    host.set_setting(Setting::Level(ChapterId(2)))?;
    host.set_setting(Setting::Latency(Latency::new(12)))?;
    client.type_text(b"gl hf")?;
    host.type_text(b"you too")?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    host.ready()?;
    client.ready()?;

    let host_session = host_task.await??;
    let client_session = client_task.await??;
    report("host", &host_session);
    report("client", &client_session);
    Ok(())
}

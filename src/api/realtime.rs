use rocket::http::Status;
use rocket::response::stream::{Event, EventStream};
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{Shutdown, State};
use serde::Serialize;
use tracing::warn;

use crate::auth::{AuthEventKind, IdentityService, User};
use crate::realtime::ChangeFeed;

use super::UserData;

/// Change events for one table. Closes when the client goes away or the
/// server shuts down.
#[get("/realtime/<table>")]
pub fn table_changes(
    table: &str,
    _user: User,
    feed: &State<ChangeFeed>,
    mut shutdown: Shutdown,
) -> Result<EventStream![], Status> {
    if !ChangeFeed::is_known_table(table) {
        return Err(Status::NotFound);
    }

    let mut rx = feed.subscribe(table);

    Ok(EventStream! {
        loop {
            let event = select! {
                msg = rx.recv() => match msg {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed subscriber lagged");
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };

            yield Event::json(&event);
        }
    })
}

#[derive(Serialize)]
struct AuthEventPayload {
    kind: AuthEventKind,
    user: Option<UserData>,
}

/// Auth state changes for the signed-in user, each carrying the freshly
/// fetched profile.
#[get("/auth/events")]
pub fn auth_events(
    user: User,
    identity: &State<IdentityService>,
    mut shutdown: Shutdown,
) -> EventStream![Event + '_] {
    let mut rx = identity.subscribe();
    let user_id = user.id;

    EventStream! {
        loop {
            let event = select! {
                msg = rx.recv() => match msg {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(_)) => continue,
                },
                _ = &mut shutdown => break,
            };

            if event.user_id != user_id {
                continue;
            }

            let profile = match identity.refetch_profile(user_id).await {
                Ok(profile) => profile.map(UserData::from),
                Err(e) => {
                    e.log_and_record("Refetching profile after auth event");
                    continue;
                }
            };

            yield Event::json(&AuthEventPayload {
                kind: event.kind,
                user: profile,
            });

            if event.kind == AuthEventKind::SignedOut {
                break;
            }
        }
    }
}

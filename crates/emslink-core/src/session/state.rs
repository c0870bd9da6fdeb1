// ── Session state machine ──
//
// Pure transition function; the actor applies transitions and publishes
// the resulting `ConnectionState`.

use uuid::Uuid;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected, or logged out.
    Disconnected,
    /// Waiting for a socket (first connect or reconnecting).
    Connecting,
    /// Socket open, no credentials accepted yet.
    WaitingForCredentials,
    /// An authentication request is in flight.
    Authenticating,
    /// Authenticated; requests go straight to the wire.
    Online,
}

impl ConnectionState {
    /// Requests issued in this state wait in the offline queue.
    pub fn is_pending_auth(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::WaitingForCredentials | Self::Authenticating
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    LoggedOut,
    Connecting,
    WaitingForCredentials,
    /// `request` is the id of the authentication request in flight.
    Authenticating { request: Uuid },
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Connect,
    LinkOpened,
    AuthStarted(Uuid),
    AuthSucceeded(Uuid),
    AuthFailed(Uuid),
    LinkLost,
    Logout,
}

impl Phase {
    /// The phase after `transition`, or `None` if it does not apply here.
    ///
    /// Auth results are only accepted for the request currently in flight,
    /// so a late answer to a superseded login cannot change state.
    pub fn next(self, transition: Transition) -> Option<Phase> {
        match (self, transition) {
            (Self::LoggedOut, Transition::Connect) => Some(Self::Connecting),
            (Self::Connecting, Transition::LinkOpened) => Some(Self::WaitingForCredentials),
            (
                Self::WaitingForCredentials | Self::Authenticating { .. } | Self::Online,
                Transition::AuthStarted(request),
            ) => Some(Self::Authenticating { request }),
            (Self::Authenticating { request }, Transition::AuthSucceeded(id)) if request == id => {
                Some(Self::Online)
            }
            (Self::Authenticating { request }, Transition::AuthFailed(id)) if request == id => {
                Some(Self::WaitingForCredentials)
            }
            (
                Self::WaitingForCredentials | Self::Authenticating { .. } | Self::Online,
                Transition::LinkLost,
            ) => Some(Self::Connecting),
            (Self::LoggedOut, Transition::Logout) => None,
            (_, Transition::Logout) => Some(Self::LoggedOut),
            _ => None,
        }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

impl From<Phase> for ConnectionState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::LoggedOut => Self::Disconnected,
            Phase::Connecting => Self::Connecting,
            Phase::WaitingForCredentials => Self::WaitingForCredentials,
            Phase::Authenticating { .. } => Self::Authenticating,
            Phase::Online => Self::Online,
        }
    }
}

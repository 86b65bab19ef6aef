use std::fmt;

/// Type tag carried in every frame header.
///
/// Tags are transmitted as `u32` in declaration order starting at 0, so the
/// order of the variants is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    // Commands
    NicknameNew = 0,
    NicknameList,
    NicknameInfos,
    EchoSend,
    UnicastSend,
    BroadcastSend,
    MulticastCreate,
    MulticastList,
    MulticastJoin,
    MulticastSend,
    MulticastQuit,
    FileRequest,
    FileAccept,
    FileReject,
    FileSend,
    FileAck,

    // Acknowledgements and errors
    NicknameSuccess,
    NicknameError,
    NicknameInfosError,
    Whoami,
    UnicastSuccess,
    UnicastError,
    BroadcastSuccess,
    BroadcastError,
    MulticastCreateSuccess,
    MulticastCreateError,
    MulticastJoinSuccess,
    MulticastJoinError,
    MulticastSendSuccess,
    MulticastSendError,
    MulticastQuitSuccess,
    MulticastQuitError,
    ServerQuit,
    QuitRequest,
    FileExistenceError,
    ReceiverExistenceError,
    TryAgainYN,
    UnknownCommand,
}

impl MessageType {
    pub const ALL: [MessageType; 38] = [
        Self::NicknameNew,
        Self::NicknameList,
        Self::NicknameInfos,
        Self::EchoSend,
        Self::UnicastSend,
        Self::BroadcastSend,
        Self::MulticastCreate,
        Self::MulticastList,
        Self::MulticastJoin,
        Self::MulticastSend,
        Self::MulticastQuit,
        Self::FileRequest,
        Self::FileAccept,
        Self::FileReject,
        Self::FileSend,
        Self::FileAck,
        Self::NicknameSuccess,
        Self::NicknameError,
        Self::NicknameInfosError,
        Self::Whoami,
        Self::UnicastSuccess,
        Self::UnicastError,
        Self::BroadcastSuccess,
        Self::BroadcastError,
        Self::MulticastCreateSuccess,
        Self::MulticastCreateError,
        Self::MulticastJoinSuccess,
        Self::MulticastJoinError,
        Self::MulticastSendSuccess,
        Self::MulticastSendError,
        Self::MulticastQuitSuccess,
        Self::MulticastQuitError,
        Self::ServerQuit,
        Self::QuitRequest,
        Self::FileExistenceError,
        Self::ReceiverExistenceError,
        Self::TryAgainYN,
        Self::UnknownCommand,
    ];

    /// Wire tag for this type.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a wire tag. Returns `None` for tags outside the enumeration.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// The typed error reply a failed or rejected command of this type is answered with.
    ///
    /// Types without a dedicated error fall back to `UnknownCommand`.
    pub fn error_reply(self) -> MessageType {
        match self {
            Self::NicknameNew => Self::NicknameError,
            Self::NicknameInfos | Self::Whoami => Self::NicknameInfosError,
            Self::UnicastSend => Self::UnicastError,
            Self::BroadcastSend => Self::BroadcastError,
            Self::MulticastCreate => Self::MulticastCreateError,
            Self::MulticastJoin => Self::MulticastJoinError,
            Self::MulticastSend => Self::MulticastSendError,
            Self::MulticastQuit => Self::MulticastQuitError,
            Self::FileRequest => Self::FileExistenceError,
            Self::FileAccept | Self::FileReject => Self::ReceiverExistenceError,
            _ => Self::UnknownCommand,
        }
    }

    /// Short lowercase name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::NicknameNew => "nickname_new",
            Self::NicknameList => "nickname_list",
            Self::NicknameInfos => "nickname_infos",
            Self::EchoSend => "echo_send",
            Self::UnicastSend => "unicast_send",
            Self::BroadcastSend => "broadcast_send",
            Self::MulticastCreate => "multicast_create",
            Self::MulticastList => "multicast_list",
            Self::MulticastJoin => "multicast_join",
            Self::MulticastSend => "multicast_send",
            Self::MulticastQuit => "multicast_quit",
            Self::FileRequest => "file_request",
            Self::FileAccept => "file_accept",
            Self::FileReject => "file_reject",
            Self::FileSend => "file_send",
            Self::FileAck => "file_ack",
            Self::NicknameSuccess => "nickname_success",
            Self::NicknameError => "nickname_error",
            Self::NicknameInfosError => "nickname_infos_error",
            Self::Whoami => "whoami",
            Self::UnicastSuccess => "unicast_success",
            Self::UnicastError => "unicast_error",
            Self::BroadcastSuccess => "broadcast_success",
            Self::BroadcastError => "broadcast_error",
            Self::MulticastCreateSuccess => "multicast_create_success",
            Self::MulticastCreateError => "multicast_create_error",
            Self::MulticastJoinSuccess => "multicast_join_success",
            Self::MulticastJoinError => "multicast_join_error",
            Self::MulticastSendSuccess => "multicast_send_success",
            Self::MulticastSendError => "multicast_send_error",
            Self::MulticastQuitSuccess => "multicast_quit_success",
            Self::MulticastQuitError => "multicast_quit_error",
            Self::ServerQuit => "server_quit",
            Self::QuitRequest => "quit_request",
            Self::FileExistenceError => "file_existence_error",
            Self::ReceiverExistenceError => "receiver_existence_error",
            Self::TryAgainYN => "try_again_y_n",
            Self::UnknownCommand => "unknown_command",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

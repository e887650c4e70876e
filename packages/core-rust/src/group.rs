/// Well-known protocol groups shared by game services.
pub struct PacketGroup;

impl PacketGroup {
    pub const LOGIN: i32 = 1;
    pub const ROLE: i32 = 2;
    pub const PAYMENT: i32 = 3;
    pub const MAIL: i32 = 4;
    pub const BAG: i32 = 5;
    pub const TASK: i32 = 6;
    pub const RANK: i32 = 7;
    pub const FRIEND: i32 = 8;
    pub const GUILD: i32 = 9;

    /// Returns the symbolic name of a well-known group.
    #[must_use]
    pub fn name(group: i32) -> Option<&'static str> {
        let name = match group {
            Self::LOGIN => "login",
            Self::ROLE => "role",
            Self::PAYMENT => "payment",
            Self::MAIL => "mail",
            Self::BAG => "bag",
            Self::TASK => "task",
            Self::RANK => "rank",
            Self::FRIEND => "friend",
            Self::GUILD => "guild",
            _ => return None,
        };
        Some(name)
    }
}

//! Short message-id table (BIP 324 section 6): a single byte standing in for
//! a common message command string once a v2 session is established. The
//! table itself is normative and must match the deployed peer verbatim; it
//! is not something either side negotiates.

/// `(short id, command string)` pairs, in the upstream-assigned order.
/// Index 0 is deliberately unused: `0x00` is the "use long form" sentinel.
const TABLE: &[(u8, &str)] = &[
    (1, "addr"),
    (2, "block"),
    (3, "blocktxn"),
    (4, "cmpctblock"),
    (5, "feefilter"),
    (6, "filteradd"),
    (7, "filterclear"),
    (8, "filterload"),
    (9, "getblocks"),
    (10, "getblocktxn"),
    (11, "getdata"),
    (12, "getheaders"),
    (13, "headers"),
    (14, "inv"),
    (15, "mempool"),
    (16, "merkleblock"),
    (17, "notfound"),
    (18, "ping"),
    (19, "pong"),
    (20, "sendcmpct"),
    (21, "tx"),
    (22, "getcfilters"),
    (23, "cfilter"),
    (24, "getcfheaders"),
    (25, "cfheaders"),
    (26, "getcfcheckpt"),
    (27, "cfcheckpt"),
    (28, "addrv2"),
];

/// Sentinel meaning "this message type has no short id; use the long form".
pub const LONG_FORM: u8 = 0x00;

/// Look up the short id for a command string, or [`LONG_FORM`] if it has
/// none.
pub fn short_id_for(command: &str) -> u8 {
    TABLE
        .iter()
        .find(|(_, cmd)| *cmd == command)
        .map(|(id, _)| *id)
        .unwrap_or(LONG_FORM)
}

/// Look up the command string for a short id, if assigned.
pub fn command_for(short_id: u8) -> Option<&'static str> {
    TABLE.iter().find(|(id, _)| *id == short_id).map(|(_, cmd)| *cmd)
}

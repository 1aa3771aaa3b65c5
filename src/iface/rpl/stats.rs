/// Counters of the RPL engine.
///
/// They only ever increase, wrapping on overflow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// An allocation in a fixed-size table failed.
    pub mem_overflows: u16,
    pub local_repairs: u16,
    pub global_repairs: u16,
    /// Control messages dropped because they could not be decoded.
    pub malformed_msgs: u16,
    /// Trickle timer resets.
    pub resets: u16,
    pub parent_switch: u16,
    pub forward_errors: u16,
    pub loop_errors: u16,
    pub loop_warnings: u16,
    pub root_repairs: u16,
}

impl core::fmt::Display for Stats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "mem_overflows={} local_repairs={} global_repairs={} malformed_msgs={} resets={} \
             parent_switch={} forward_errors={} loop_errors={} loop_warnings={} root_repairs={}",
            self.mem_overflows,
            self.local_repairs,
            self.global_repairs,
            self.malformed_msgs,
            self.resets,
            self.parent_switch,
            self.forward_errors,
            self.loop_errors,
            self.loop_warnings,
            self.root_repairs
        )
    }
}

/// Bump a counter of [`Stats`].
macro_rules! rpl_stat {
    ($stats:expr, $counter:ident) => {
        $stats.$counter = $stats.$counter.wrapping_add(1)
    };
}

use std::ops::{BitAnd, Shl, Shr};

use num::Integer;

/// Make an n_bits-long mask (all ones)
pub fn mask<T>(n_bits: T) -> T
where
    T: Integer + Shl<Output = T>,
{
    (T::one() << n_bits) - T::one()
}

/// Obtain value[end:start] (verilog notation) from value
pub fn extract_field<T>(value: T, end: T, start: T) -> T
where
    T: Copy + Integer + Shl<Output = T> + Shr<Output = T> + BitAnd<Output = T>,
{
    mask(end - start + T::one()) & (value >> start)
}

pub fn interpret_u32_as_signed(value: u32) -> i32 {
    i32::from_ne_bytes(value.to_ne_bytes())
}

pub fn interpret_i32_as_unsigned(value: i32) -> u32 {
    u32::from_ne_bytes(value.to_ne_bytes())
}

/// Take an unsigned value (u8, u16 or u32), and a bit position for the
/// sign bit, and copy the value of the sign bit into all the higher bits
/// of the u32.
pub fn sign_extend<T: Into<u32>>(value: T, sign_bit_position: u32) -> u32 {
    let value: u32 = value.into();
    let sign_bit = 1 & (value >> sign_bit_position);
    if sign_bit == 1 {
        let sign_extension = 0xffff_ffff - mask(sign_bit_position);
        value | sign_extension
    } else {
        value
    }
}

/// Sign-extend the low 16 bits of a word
pub fn imm16(word: u32) -> i32 {
    interpret_u32_as_signed(sign_extend(word as u16, 15))
}

/// Return a short user-friendly string for a quantity (e.g. "2.5k", "13M").
/// Used by the perf profiler.
pub fn eng(value: f64) -> String {
    if value < 5.0 {
        format!("{value:.2}")
    } else if value < 1000.0 {
        format!("{value:.0}")
    } else if value < 10_000.0 {
        format!("{:.1}k", value / 1000.0).replace(".0", "")
    } else if value < 1e6 {
        format!("{:.0}k", value / 1000.0)
    } else if value < 10e6 {
        format!("{:.1}M", value / 1e6).replace(".0", "")
    } else if value < 1e9 {
        format!("{:.0}M", value / 1e6)
    } else if value < 1e12 {
        format!("{:.0}G", value / 1e9)
    } else {
        "huge".to_string()
    }
}

/// Return a short user-friendly string for a duration in seconds
pub fn time2s(seconds: f64) -> String {
    if seconds < 5.0 {
        return format!("{seconds:.2}s");
    }
    if seconds < 10.0 {
        return format!("{seconds:.1}s");
    }
    if seconds < 60.0 {
        return format!("{}s", seconds as u64);
    }

    let mins = (seconds / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;

    if mins < 3 {
        return format!("{mins}m{}", time2s(secs as f64));
    }
    if mins < 10 {
        return if secs < 15 {
            format!("{mins}m")
        } else if secs > 45 {
            format!("{}m", mins + 1)
        } else {
            format!("{mins}m{}", time2s(secs as f64))
        };
    }

    let hours = (seconds / 3600.0) as u64;
    let mins = ((seconds % 3600.0) / 60.0) as u64;

    if hours == 0 {
        return format!("{mins}m");
    }
    if mins < 15 {
        format!("{hours}h")
    } else if mins > 45 {
        format!("{}h", hours + 1)
    } else {
        format!("{hours}h{mins}m")
    }
}

macro_rules! impl_hex {
    ($type:ty) => {
        impl ::std::fmt::Debug for Hex<$type> {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                hex_fmt(f, self.0)
            }
        }

        impl ::std::fmt::Display for Hex<$type> {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                hex_fmt(f, self.0)
            }
        }
    };
}

fn hex_fmt<T>(f: &mut ::std::fmt::Formatter, data: T) -> ::std::fmt::Result
where
    T: Copy + ::std::fmt::LowerHex,
{
    match size_of::<T>() {
        1 => write!(f, "0x{:02x}", data),
        2 => write!(f, "0x{:04x}", data),
        4 => write!(f, "0x{:08x}", data),
        8 => write!(f, "0x{:016x}", data),
        _ => write!(f, "0x{:x}", data),
    }
}

/// A fixed-width hexadecimal representation of a value.
///
/// Used to render codes and remote addresses in log records and messages.
///
/// # Examples
///
/// ```
/// # use remora::Hex;
/// assert_eq!(format!("{}", Hex(258u32)), "0x00000102");
/// ```
pub struct Hex<T>(pub T);

impl_hex!(u8);
impl_hex!(u16);
impl_hex!(u32);
impl_hex!(u64);
impl_hex!(usize);

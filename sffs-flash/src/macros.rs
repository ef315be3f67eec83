/// Automatically implements little-endian read/write helpers for primitive
/// types on Flash
#[macro_export]
macro_rules! flash_impl_primitive_rw {
    ($($ty:ty),+ $(,)?) => {
        $(
            paste::paste! {
                #[inline(always)]
                fn [<write_ $ty _at>](&mut self, addr: u32, value: $ty) -> FlashResult {
                    let buf = value.to_le_bytes();
                    self.page_write(addr, &buf)
                }

                #[inline(always)]
                fn [<read_ $ty _at>](&mut self, addr: u32) -> FlashResult<$ty> {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    self.page_read(addr, &mut buf)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }
        )+
    };
}

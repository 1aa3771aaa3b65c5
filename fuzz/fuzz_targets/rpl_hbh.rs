#![no_main]
use libfuzzer_sys::fuzz_target;
use rpl_orchestra::wire::*;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = RplHopByHopPacket::new_checked(data) {
        if let Ok(repr) = RplHopByHopRepr::parse(&packet) {
            let mut buffer = vec![0u8; repr.buffer_len()];
            repr.emit(&mut RplHopByHopPacket::new_unchecked(&mut buffer[..]));
            let packet = RplHopByHopPacket::new_checked(&buffer[..]).unwrap();
            assert_eq!(RplHopByHopRepr::parse(&packet), Ok(repr));
        }
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;
use rpl_orchestra::wire::*;

#[derive(Debug, arbitrary::Arbitrary)]
struct RplPacketFuzzer<'a> {
    data: &'a [u8],
    src_addr: [u8; 16],
    dst_addr: [u8; 16],
}

fuzz_target!(|data: RplPacketFuzzer| {
    let src = Ipv6Address::from(data.src_addr);
    let dst = Ipv6Address::from(data.dst_addr);

    if let Ok(packet) = RplPacket::new_checked(data.data) {
        if let Ok(repr) = RplRepr::parse(&packet) {
            let mut buffer = vec![0u8; repr.buffer_len()];
            let mut packet = RplPacket::new_unchecked(&mut buffer[..]);
            repr.emit(&mut packet);
            packet.fill_checksum(&src, &dst);

            let packet = RplPacket::new_checked(&buffer[..]).unwrap();
            assert!(packet.verify_checksum(&src, &dst));
            assert_eq!(RplRepr::parse(&packet), Ok(repr));
        }
    }
});

//! The free-block allocator, backed by the on-disk bitmap.

use ferrofs_types::{BITS_PER_BLOCK, BitmapBlock, BlockNo};

use super::Tx;

/// Zeros a block through the log.
fn zero(tx: &Tx<false>, bn: BlockNo) {
    let mut bh = tx.get_block(bn);
    let bg = bh.lock().zeroed();
    tx.log_write(&bg);
}

/// Allocates a zeroed disk block.
///
/// # Panics
///
/// Panics if no free block exists.
pub(super) fn alloc(tx: &Tx<false>) -> BlockNo {
    let sb = tx.fs().superblock();
    let size = usize::try_from(sb.size).unwrap();
    for bn0 in (0..size).step_by(BITS_PER_BLOCK) {
        let mut bh = tx.get_block(sb.bitmap_block(bn0));
        let mut bg = bh.lock().read();
        let Some(bit) = (0..BITS_PER_BLOCK)
            .take_while(|bit| bn0 + bit < size)
            .find(|&bit| !bg.data::<BitmapBlock>().bit(bit))
        else {
            continue;
        };
        bg.data_mut::<BitmapBlock>().set_bit(bit); // mark block in use
        tx.log_write(&bg);
        drop(bg);
        drop(bh);

        let bn = BlockNo::new(u32::try_from(bn0 + bit).unwrap());
        zero(tx, bn);
        return bn;
    }
    panic!("out of data blocks");
}

/// Frees a disk block.
///
/// # Panics
///
/// Panics if the block is already free.
pub(super) fn free(tx: &Tx<false>, bn: BlockNo) {
    let sb = tx.fs().superblock();
    let mut bh = tx.get_block(sb.bitmap_block(bn.as_index()));
    let mut bg = bh.lock().read();
    let bit = bn.as_index() % BITS_PER_BLOCK;
    assert!(bg.data::<BitmapBlock>().bit(bit), "freeing free block");
    bg.data_mut::<BitmapBlock>().clear_bit(bit);
    tx.log_write(&bg);
}

use crate::batch::TxBlock;
use crate::block::Block;
use crate::field::{Field, FieldType, FIELD_SIZE};
use crate::wallet::{KeyId, Keypair, Signature};

fn split_sig(sig: &Signature) -> ([u8; FIELD_SIZE], [u8; FIELD_SIZE]) {
    let bytes = sig.to_bytes();
    let mut r = [0u8; FIELD_SIZE];
    let mut s = [0u8; FIELD_SIZE];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    (r, s)
}

// public keys embedded in a block, in slot order
pub fn pubkeys(block: &Block) -> Vec<KeyId> {
    block
        .fields
        .iter()
        .filter(|f| matches!(f.kind, FieldType::PublicKey0 | FieldType::PublicKey1))
        .map(|f| *f.data())
        .collect()
}

// signature fields of one kind, paired up (r field then s field) in slot order
pub fn sign_pairs(block: &Block, kind: FieldType) -> Vec<Signature> {
    let halves: Vec<&Field> = block.fields_of(kind).collect();
    halves
        .chunks_exact(2)
        .filter_map(|pair| {
            let mut bytes = [0u8; 64];
            bytes[..32].copy_from_slice(pair[0].data());
            bytes[32..].copy_from_slice(pair[1].data());
            Signature::try_from(&bytes[..]).ok()
        })
        .collect()
}

// applies one signature per distinct contributing key, in order of first
// appearance. non-default keys authorize inputs (SIGN_IN); the default key
// signs the output commitment (SIGN_OUT) whether or not it funded anything.
// all signature slots are placed first so every signer commits to the same
// content hash.
pub fn apply(tx: TxBlock, def_key: &Keypair) -> Block {
    let TxBlock { mut block, inputs, .. } = tx;
    let def_id = def_key.id();
    let mut order: Vec<&Keypair> = Vec::new();
    for (_, key) in &inputs {
        if key.id() != def_id && !order.iter().any(|k| k.id() == key.id()) {
            order.push(*key);
        }
    }
    let mut slots: Vec<(usize, usize)> = Vec::new();
    for key in &order {
        assert!(block.push(Field::new(FieldType::PublicKey0, key.id())).is_ok());
        let r = block.push(Field::zero(FieldType::SignIn)).expect("reserved slot");
        let s = block.push(Field::zero(FieldType::SignIn)).expect("reserved slot");
        slots.push((r, s));
    }
    let out_r = block.push(Field::zero(FieldType::SignOut)).expect("reserved slot");
    let out_s = block.push(Field::zero(FieldType::SignOut)).expect("reserved slot");
    // the strict sub-16 commit bound always leaves this slot free
    assert!(block.push(Field::new(FieldType::PublicKey0, def_id)).is_ok());
    let msg = block.signing_hash();
    for (key, (r, s)) in order.iter().zip(slots) {
        let (rb, sb) = split_sig(&key.sign(&msg));
        block.fields[r].set_data(rb);
        block.fields[s].set_data(sb);
    }
    let (rb, sb) = split_sig(&def_key.sign(&msg));
    block.fields[out_r].set_data(rb);
    block.fields[out_s].set_data(sb);
    block
}

//! Script interpreter scenarios over the public API: full
//! pay-to-pubkey-hash style spends with real signatures, flag gating, and
//! failure determinism.

use cashcore::amount::Amount;
use cashcore::error::ScriptError;
use cashcore::hash::{hash160, TxId};
use cashcore::script::{
    signature_hash, verify_script, NoSignatureChecker, ScriptFlags,
    TransactionSignatureChecker, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160, SIGHASH_ALL,
};
use cashcore::sigcache::SigCache;
use cashcore::types::{OutPoint, Transaction, TxIn, TxOut};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

fn spending_pair(script_pubkey: Vec<u8>) -> (Transaction, TxOut) {
    let spent = TxOut {
        value: Amount::from_sats(100_000),
        script_pubkey,
    };
    let tx = Transaction {
        version: 2,
        inputs: vec![TxIn {
            prevout: OutPoint::new(TxId::from_bytes([5; 32]), 0),
            script_sig: vec![],
            sequence: 0xffff_fffe,
        }],
        outputs: vec![TxOut {
            value: Amount::from_sats(98_000),
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    };
    (tx, spent)
}

fn p2pkh_script(pubkey: &[u8]) -> Vec<u8> {
    let h = hash160(pubkey);
    let mut script = vec![OP_DUP, OP_HASH160, 20];
    script.extend_from_slice(&h);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

fn push(script: &mut Vec<u8>, data: &[u8]) {
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

#[test]
fn test_p2pkh_spend_with_real_signature() {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk).serialize();

    let spk = p2pkh_script(&pk);
    let (mut tx, spent) = spending_pair(spk.clone());

    let digest = signature_hash(&tx, 0, &spent, SIGHASH_ALL);
    let msg = Message::from_digest_slice(&digest).unwrap();
    let mut sig = secp.sign_ecdsa(&msg, &sk).serialize_der().to_vec();
    sig.push(SIGHASH_ALL);

    let mut script_sig = Vec::new();
    push(&mut script_sig, &sig);
    push(&mut script_sig, &pk);
    tx.inputs[0].script_sig = script_sig.clone();

    let flags = ScriptFlags::STRICTENC
        | ScriptFlags::LOW_S
        | ScriptFlags::SIGPUSHONLY
        | ScriptFlags::CLEANSTACK
        | ScriptFlags::MINIMALDATA;
    let mut checker = TransactionSignatureChecker::new(&tx, 0, &spent);
    let metrics = verify_script(&script_sig, &spk, flags, &mut checker).unwrap();
    assert_eq!(metrics.sigchecks, 1);
}

#[test]
fn test_p2pkh_wrong_key_fails_at_hash_check() {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk).serialize();
    let other = PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[0x43; 32]).unwrap())
        .serialize();

    // Locked to `other`, unlocked with `pk`: the hash comparison fails
    // before any signature is looked at.
    let spk = p2pkh_script(&other);
    let (tx, spent) = spending_pair(spk.clone());
    let mut script_sig = Vec::new();
    push(&mut script_sig, &[0x30, 0x01, 0x00]); // placeholder, never checked
    push(&mut script_sig, &pk);

    let mut checker = TransactionSignatureChecker::new(&tx, 0, &spent);
    assert_eq!(
        verify_script(&script_sig, &spk, ScriptFlags::empty(), &mut checker),
        Err(ScriptError::EqualVerify)
    );
}

#[test]
fn test_signature_commits_to_spent_amount() {
    // Altering the claimed amount of the output being spent invalidates
    // the signature.
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk).serialize();

    let spk = p2pkh_script(&pk);
    let (tx, spent) = spending_pair(spk.clone());
    let digest = signature_hash(&tx, 0, &spent, SIGHASH_ALL);
    let msg = Message::from_digest_slice(&digest).unwrap();
    let mut sig = secp.sign_ecdsa(&msg, &sk).serialize_der().to_vec();
    sig.push(SIGHASH_ALL);
    let mut script_sig = Vec::new();
    push(&mut script_sig, &sig);
    push(&mut script_sig, &pk);

    let inflated = TxOut {
        value: Amount::from_sats(200_000),
        script_pubkey: spent.script_pubkey.clone(),
    };
    let mut checker = TransactionSignatureChecker::new(&tx, 0, &inflated);
    assert_eq!(
        verify_script(&script_sig, &spk, ScriptFlags::empty(), &mut checker),
        Err(ScriptError::SigNullFail)
    );
}

#[test]
fn test_sigcache_hit_on_second_verification() {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let pk = PublicKey::from_secret_key(&secp, &sk).serialize();

    let spk = p2pkh_script(&pk);
    let (tx, spent) = spending_pair(spk.clone());
    let digest = signature_hash(&tx, 0, &spent, SIGHASH_ALL);
    let msg = Message::from_digest_slice(&digest).unwrap();
    let mut sig = secp.sign_ecdsa(&msg, &sk).serialize_der().to_vec();
    sig.push(SIGHASH_ALL);
    let mut script_sig = Vec::new();
    push(&mut script_sig, &sig);
    push(&mut script_sig, &pk);

    let cache = SigCache::new(64);
    assert!(cache.is_empty());
    for _ in 0..2 {
        let mut checker =
            TransactionSignatureChecker::new(&tx, 0, &spent).with_cache(&cache);
        verify_script(&script_sig, &spk, ScriptFlags::empty(), &mut checker).unwrap();
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_failure_is_deterministic() {
    // The same hostile script must fail identically on every evaluation.
    let script_sig = [0x51, 0x51];
    let spk = [0x9a, 0x69]; // BOOLAND VERIFY, leaves nothing
    let first = verify_script(
        &script_sig,
        &spk,
        ScriptFlags::empty(),
        &mut NoSignatureChecker,
    );
    for _ in 0..20 {
        let again = verify_script(
            &script_sig,
            &spk,
            ScriptFlags::empty(),
            &mut NoSignatureChecker,
        );
        assert_eq!(again, first);
    }
    assert!(first.is_err());
}

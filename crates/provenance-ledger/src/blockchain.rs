//! The blockchain state machine.
//!
//! A [`Blockchain`] owns the chain, the mempool and a storage backend. It is
//! synchronous and single-writer: callers that share it wrap it in a lock
//! (see [`Node`](crate::Node)). Every mutation persists first and only then
//! touches memory, so a storage failure leaves the in-memory state as it was.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use provenance_conditions::Evaluator;
use provenance_core::{
    classify_block, validate_block, validate_chain, Block, BlockReception, CoreError, PowStrategy,
    PreviousHash, ProofOfWork, Transaction, ValidationError,
};
use provenance_store::StorageBackend;

use crate::config::LedgerConfig;
use crate::error::{AdmissionError, LedgerError, Result};

/// Seconds since the Unix epoch.
pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// An unsealed block template, ready to be sealed without holding any lock.
#[derive(Debug, Clone)]
pub struct MiningJob {
    block: Block,
    difficulty: u32,
}

impl MiningJob {
    /// The block that will be sealed.
    pub fn template(&self) -> &Block {
        &self.block
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Search for the nonce and seal the block.
    pub fn run(self, pow: &dyn ProofOfWork) -> std::result::Result<Block, CoreError> {
        self.block.seal(pow, self.difficulty)
    }
}

/// A hash-linked chain of blocks plus pending transactions.
pub struct Blockchain<S: StorageBackend> {
    /// Never empty: [`Blockchain::open`] seeds a genesis block and
    /// [`Blockchain::replace_chain`] only installs longer valid chains.
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
    storage: S,
    difficulty: u32,
    pow: PowStrategy,
    evaluator: Evaluator,
    require_signatures: bool,
}

impl<S: StorageBackend> Blockchain<S> {
    /// Load the chain from `storage`, or mine and persist a genesis block if
    /// storage is empty.
    ///
    /// A stored chain that fails validation at the configured difficulty is
    /// refused with [`LedgerError::CorruptChain`].
    pub fn open(storage: S, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;

        let mut chain = storage.load_chain()?;
        if chain.is_empty() {
            let genesis = Block::genesis(&config.pow, config.difficulty)?;
            storage.save_block(&genesis)?;
            info!(hash = %genesis.hash, difficulty = config.difficulty, "created genesis block");
            chain.push(genesis);
        } else {
            validate_chain(&chain, config.difficulty).map_err(LedgerError::CorruptChain)?;
            info!(len = chain.len(), "loaded chain from storage");
        }

        Ok(Self {
            chain,
            mempool: Vec::new(),
            storage,
            difficulty: config.difficulty,
            pow: config.pow,
            evaluator: config.evaluator,
            require_signatures: config.require_signatures,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn last_block(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn pow(&self) -> PowStrategy {
        self.pow
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always `false`: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Check `tx` and add it to the mempool.
    ///
    /// A transaction carrying both a signature and a public key must verify.
    /// A transaction declaring a condition must satisfy it, with its own
    /// fields as the variables.
    pub fn admit_transaction(&mut self, tx: Transaction) -> std::result::Result<(), AdmissionError> {
        if let Err(e) = self.check_admission(&tx) {
            warn!(error = %e, "transaction rejected");
            return Err(e);
        }

        self.mempool.push(tx);
        debug!(pending = self.mempool.len(), "transaction admitted");
        Ok(())
    }

    fn check_admission(&self, tx: &Transaction) -> std::result::Result<(), AdmissionError> {
        let signed = tx.verify_signature()?;
        if !signed && self.require_signatures {
            return Err(AdmissionError::SignatureRequired);
        }

        if let Some(script) = tx.condition() {
            if !self.evaluator.evaluate(script, &tx.to_map())? {
                return Err(AdmissionError::ConditionFailed(script.to_string()));
            }
        }

        Ok(())
    }

    /// A pending transaction registering `digest`, if any.
    pub fn find_pending(&self, digest: &str) -> Option<&Transaction> {
        self.mempool.iter().find(|tx| tx.references(digest))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mining
    // ─────────────────────────────────────────────────────────────────────────

    /// Mine every pending transaction into a new block.
    ///
    /// Returns the new block's index, or `None` when the mempool is empty.
    pub fn mine(&mut self) -> Result<Option<u64>> {
        let Some(job) = self.prepare_mining() else {
            return Ok(None);
        };
        let sealed = job.run(&self.pow)?;
        self.commit_mined(sealed).map(Some)
    }

    /// Snapshot the tip and the mempool into a job that can be sealed
    /// elsewhere. `None` when there is nothing to mine.
    pub fn prepare_mining(&self) -> Option<MiningJob> {
        if self.mempool.is_empty() {
            return None;
        }

        let tip = self.last_block();
        let block = Block::new(
            tip.index + 1,
            self.mempool.clone(),
            now_secs(),
            PreviousHash::Block(tip.hash),
        );
        Some(MiningJob {
            block,
            difficulty: self.difficulty,
        })
    }

    /// Append a block sealed from a [`MiningJob`].
    ///
    /// Fails with [`LedgerError::StaleBlock`] if the tip moved or the mined
    /// transactions are no longer at the front of the mempool.
    pub fn commit_mined(&mut self, block: Block) -> Result<u64> {
        let tip = self.last_block();
        if block.index != tip.index + 1 || block.previous_hash != tip.hash {
            return Err(LedgerError::StaleBlock { index: block.index });
        }

        let mined = block.transactions.len();
        if !self.mempool.starts_with(&block.transactions) {
            return Err(LedgerError::StaleBlock { index: block.index });
        }

        validate_block(&block, tip, self.difficulty)?;
        self.storage.save_block(&block)?;

        self.mempool.drain(..mined);
        let index = block.index;
        info!(index, hash = %block.hash, nonce = block.nonce, transactions = mined, "mined block");
        self.chain.push(block);
        Ok(index)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Check `block` as the successor of `previous` at this chain's difficulty.
    pub fn validate_block(&self, block: &Block, previous: &Block) -> std::result::Result<(), ValidationError> {
        validate_block(block, previous, self.difficulty)
    }

    pub fn is_valid_block(&self, block: &Block, previous: &Block) -> bool {
        self.validate_block(block, previous).is_ok()
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        validate_chain(chain, self.difficulty).is_ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consensus
    // ─────────────────────────────────────────────────────────────────────────

    /// Adopt `candidate` if it is strictly longer than the local chain and
    /// valid. Returns whether the chain was replaced.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.len() <= self.chain.len() {
            debug!(
                local = self.chain.len(),
                candidate = candidate.len(),
                "candidate chain is not longer"
            );
            return Ok(false);
        }
        if let Err(e) = validate_chain(&candidate, self.difficulty) {
            warn!(error = %e, "candidate chain is invalid");
            return Ok(false);
        }

        self.storage.replace_chain(&candidate)?;
        self.prune_mempool(&candidate);
        info!(old = self.chain.len(), new = candidate.len(), "replaced chain");
        self.chain = candidate;
        Ok(true)
    }

    /// Handle a block announced by a peer.
    ///
    /// Only [`BlockReception::Accepted`] changes state; the block is then
    /// persisted and appended.
    pub fn receive_block(&mut self, block: Block) -> Result<BlockReception> {
        let reception = classify_block(&block, self.last_block(), self.difficulty);
        match &reception {
            BlockReception::Accepted => {
                self.storage.save_block(&block)?;
                self.prune_mempool(std::slice::from_ref(&block));
                info!(index = block.index, hash = %block.hash, "appended block from peer");
                self.chain.push(block);
            }
            BlockReception::NeedsResync => {
                debug!(index = block.index, tip = self.last_block().index, "block needs resync");
            }
            BlockReception::Rejected(e) => {
                warn!(index = block.index, error = %e, "rejected block from peer");
            }
        }
        Ok(reception)
    }

    fn prune_mempool(&mut self, blocks: &[Block]) {
        let before = self.mempool.len();
        self.mempool
            .retain(|tx| !blocks.iter().any(|b| b.transactions.contains(tx)));
        let pruned = before - self.mempool.len();
        if pruned > 0 {
            debug!(pruned, "dropped pending transactions already on chain");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// The first committed transaction whose image or source hash is
    /// `digest`.
    pub fn find_transaction(&self, digest: &str) -> Result<Option<Transaction>> {
        Ok(self.storage.find_transaction_by_hash(digest)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_conditions::ConditionError;
    use provenance_core::{KeyPair, ScalarPow};
    use provenance_store::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    const DIFFICULTY: u32 = 1;

    fn make_test_config() -> LedgerConfig {
        LedgerConfig {
            difficulty: DIFFICULTY,
            pow: PowStrategy::Scalar,
            ..LedgerConfig::default()
        }
    }

    fn make_test_chain() -> Blockchain<MemoryBackend> {
        Blockchain::open(MemoryBackend::new(), &make_test_config()).unwrap()
    }

    fn make_test_tx(seq: u64) -> Transaction {
        Transaction::from_json(json!({
            "image_hash": format!("img{}", seq),
            "seq": seq,
        }))
        .unwrap()
    }

    #[test]
    fn test_open_seeds_genesis() {
        let chain = make_test_chain();
        assert_eq!(chain.len(), 1);
        assert!(chain.last_block().is_genesis());
        assert_eq!(chain.storage().block_count().unwrap(), 1);
        assert!(chain.is_valid_chain(chain.chain()));
    }

    #[test]
    fn test_open_reloads_existing_chain() {
        let storage = Arc::new(MemoryBackend::new());
        let mut first = Blockchain::open(Arc::clone(&storage), &make_test_config()).unwrap();
        first.admit_transaction(make_test_tx(1)).unwrap();
        first.mine().unwrap();

        let second = Blockchain::open(Arc::clone(&storage), &make_test_config()).unwrap();
        assert_eq!(second.chain(), first.chain());
    }

    #[test]
    fn test_open_refuses_corrupt_chain() {
        let storage = Arc::new(MemoryBackend::new());
        let genesis = Block::genesis(&ScalarPow, DIFFICULTY).unwrap();
        let orphan = Block::new(1, vec![make_test_tx(1)], 1.0, PreviousHash::Block(genesis.recompute_hash()))
            .seal(&ScalarPow, DIFFICULTY)
            .unwrap();
        let mut forged = orphan.clone();
        forged.index = 2;
        storage.save_block(&genesis).unwrap();
        storage.save_block(&forged).unwrap();

        assert!(matches!(
            Blockchain::open(storage, &make_test_config()),
            Err(LedgerError::CorruptChain(_))
        ));
    }

    #[test]
    fn test_mine_empty_mempool() {
        let mut chain = make_test_chain();
        assert_eq!(chain.mine().unwrap(), None);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_mine_appends_and_clears_mempool() {
        let mut chain = make_test_chain();
        chain.admit_transaction(make_test_tx(1)).unwrap();
        chain.admit_transaction(make_test_tx(2)).unwrap();

        assert_eq!(chain.mine().unwrap(), Some(1));
        assert!(chain.mempool().is_empty());

        let tip = chain.last_block();
        assert_eq!(tip.transactions.len(), 2);
        assert_eq!(tip.previous_hash, chain.chain()[0].hash);
        assert!(tip.hash.meets_difficulty(DIFFICULTY));
        assert!(chain.is_valid_chain(chain.chain()));
        assert_eq!(chain.find_transaction("img2").unwrap(), Some(make_test_tx(2)));
    }

    #[test]
    fn test_mine_single_transfer() {
        let mut chain = make_test_chain();
        let tx = Transaction::from_json(json!({"sender": "A", "receiver": "B", "amount": 10})).unwrap();
        chain.admit_transaction(tx.clone()).unwrap();

        assert_eq!(chain.mine().unwrap(), Some(1));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.chain()[1].previous_hash, chain.chain()[0].hash);
        assert_eq!(chain.chain()[1].transactions, vec![tx]);
        assert!(chain.mempool().is_empty());
    }

    #[test]
    fn test_signed_transaction_admission() {
        let keypair = KeyPair::generate(1024).unwrap();
        let mut chain = make_test_chain();

        let mut tx = make_test_tx(1);
        tx.sign(&keypair).unwrap();
        chain.admit_transaction(tx.clone()).unwrap();

        let mut tampered = tx;
        tampered.insert("seq", json!(99)).unwrap();
        assert_eq!(
            chain.admit_transaction(tampered),
            Err(AdmissionError::InvalidSignature)
        );

        let mut garbled = make_test_tx(2);
        garbled.set_public_key("not a pem");
        garbled.insert("signature", json!("c2ln")).unwrap();
        assert!(matches!(
            chain.admit_transaction(garbled),
            Err(AdmissionError::MalformedPublicKey(_))
        ));

        assert_eq!(chain.mempool().len(), 1);
    }

    #[test]
    fn test_required_signatures() {
        let config = LedgerConfig {
            require_signatures: true,
            ..make_test_config()
        };
        let mut chain = Blockchain::open(MemoryBackend::new(), &config).unwrap();
        assert_eq!(
            chain.admit_transaction(make_test_tx(1)),
            Err(AdmissionError::SignatureRequired)
        );

        let mut tx = make_test_tx(1);
        tx.sign(&KeyPair::generate(1024).unwrap()).unwrap();
        chain.admit_transaction(tx).unwrap();
    }

    #[test]
    fn test_condition_admission() {
        let mut chain = make_test_chain();

        let mut ok = make_test_tx(5);
        ok.set_condition("seq >= 5 and seq < 10");
        chain.admit_transaction(ok).unwrap();

        let mut fails = make_test_tx(2);
        fails.set_condition("seq >= 5");
        assert_eq!(
            chain.admit_transaction(fails),
            Err(AdmissionError::ConditionFailed("seq >= 5".into()))
        );

        let mut broken = make_test_tx(3);
        broken.set_condition("missing > 1");
        assert_eq!(
            chain.admit_transaction(broken),
            Err(AdmissionError::ConditionError(ConditionError::UnknownVariable(
                "missing".into()
            )))
        );

        assert_eq!(chain.mempool().len(), 1);
    }

    #[test]
    fn test_commit_rejects_stale_job() {
        let mut chain = make_test_chain();
        chain.admit_transaction(make_test_tx(1)).unwrap();

        let stale = chain.prepare_mining().unwrap();
        chain.mine().unwrap();
        chain.admit_transaction(make_test_tx(2)).unwrap();

        let sealed = stale.run(&ScalarPow).unwrap();
        assert!(matches!(
            chain.commit_mined(sealed),
            Err(LedgerError::StaleBlock { index: 1 })
        ));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.mempool().len(), 1);
    }

    #[test]
    fn test_commit_keeps_later_admissions() {
        let mut chain = make_test_chain();
        chain.admit_transaction(make_test_tx(1)).unwrap();
        let job = chain.prepare_mining().unwrap();
        chain.admit_transaction(make_test_tx(2)).unwrap();

        let sealed = job.run(&ScalarPow).unwrap();
        assert_eq!(chain.commit_mined(sealed).unwrap(), 1);
        assert_eq!(chain.mempool(), &[make_test_tx(2)]);
    }

    #[test]
    fn test_replace_chain() {
        let mut local = make_test_chain();
        let mut remote = make_test_chain();
        for seq in 1..=3 {
            remote.admit_transaction(make_test_tx(seq)).unwrap();
            remote.mine().unwrap();
        }

        let same_length = local.chain().to_vec();
        assert!(!local.replace_chain(same_length).unwrap());

        let mut tampered = remote.chain().to_vec();
        tampered[2].transactions[0].insert("seq", json!(42)).unwrap();
        assert!(!local.replace_chain(tampered).unwrap());
        assert_eq!(local.len(), 1);

        local.admit_transaction(make_test_tx(2)).unwrap();
        assert!(local.replace_chain(remote.chain().to_vec()).unwrap());
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.storage().load_chain().unwrap(), remote.chain());
        assert!(local.mempool().is_empty());
    }

    #[test]
    fn test_receive_block() {
        let mut local = make_test_chain();
        let mut remote = make_test_chain();
        for seq in 1..=3 {
            remote.admit_transaction(make_test_tx(seq)).unwrap();
            remote.mine().unwrap();
        }
        let blocks = remote.chain().to_vec();

        assert_eq!(local.receive_block(blocks[2].clone()).unwrap(), BlockReception::NeedsResync);
        assert_eq!(local.receive_block(blocks[1].clone()).unwrap(), BlockReception::Accepted);
        assert_eq!(local.len(), 2);
        assert!(matches!(
            local.receive_block(blocks[1].clone()).unwrap(),
            BlockReception::Rejected(ValidationError::IndexMismatch { .. })
        ));

        let mut forged = blocks[2].clone();
        forged.nonce += 1;
        assert!(matches!(
            local.receive_block(forged).unwrap(),
            BlockReception::Rejected(_)
        ));
        assert_eq!(local.len(), 2);
        assert_eq!(local.storage().block_count().unwrap(), 2);
    }

    #[test]
    fn test_validation_helpers() {
        let mut chain = make_test_chain();
        chain.admit_transaction(make_test_tx(1)).unwrap();
        chain.mine().unwrap();

        let (genesis, block) = (&chain.chain()[0], &chain.chain()[1]);
        assert!(chain.is_valid_block(block, genesis));

        let mut bad = block.clone();
        bad.merkle_root = genesis.merkle_root;
        assert!(!chain.is_valid_block(&bad, genesis));
        assert!(!chain.is_valid_chain(&[]));
    }
}

//! Loading search networks from text files and decoding over them.

use std::fs;
use std::path::Path;

use wfst_decoder::error::DecoderError;
use wfst_decoder::search::{
    HmmInventory, ModelInventory, ScoreMatrix, SearchConfig, SearchEngine, WordEndDetector,
    WordEndType,
};
use wfst_decoder::types::Label;
use wfst_decoder::wfst::{NetworkManager, SearchNetwork, SymbolTable, TextFstSource};

const LEXICON: &str = "\
# k-ae-t -> cat, d-o-g -> dog
0 1 1 10 0.5
1 2 2 0
2 0 3 0
0 3 4 11 0.5
3 4 5 0
4 0 6 0
0 0 7 0 1.0
0
";

const GRAMMAR: &str = "\
0 0 10 10 1.0
0 0 11 11 2.0
0 1.5
";

const SYMBOLS: &str = "\
<eps> 0
cat 10
dog 11
";

const MODELS: &str = "\
k-ae-t 1 2 3
d-o-g 4 5 6
sil 7
";

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn manager(dir: &Path) -> NetworkManager<TextFstSource> {
    let grammar = write(dir, "G.txt", GRAMMAR);
    let lexicon = write(dir, "L.txt", LEXICON);
    NetworkManager::new(TextFstSource::new(grammar, lexicon), 1.0)
}

#[test]
fn decodes_words_from_text_networks() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());
    manager.init().unwrap();
    let symbols = SymbolTable::load_from_file(write(dir.path(), "words.txt", SYMBOLS)).unwrap();
    let inventory = HmmInventory::load_from_file(write(dir.path(), "models.txt", MODELS)).unwrap();
    let inventory: std::sync::Arc<dyn ModelInventory> = std::sync::Arc::new(inventory);
    let detector = WordEndDetector::new(WordEndType::Hmm, Some(inventory), &["sil".to_string()])
        .unwrap();

    // sil, k, ae, t, d, o, g; every other label costs 5
    let frames = [7u32, 1, 2, 3, 4, 5, 6];
    let rows = frames
        .iter()
        .map(|&best| {
            (0..8)
                .map(|l| if l == best { 0.0 } else { 5.0 })
                .collect::<Vec<f32>>()
        })
        .collect();
    let scores = ScoreMatrix::new(rows);

    let mut engine = SearchEngine::new(
        SearchConfig {
            purge_interval: 2,
            ..SearchConfig::default()
        },
        manager.network().unwrap(),
        detector,
    );
    let path = engine.decode(&scores, scores.len()).unwrap().unwrap();

    assert_eq!(path.words(), vec![Label(10), Label(11)]);
    assert_eq!(symbols.render(path.words()), "cat dog");
    let times: Vec<u32> = path
        .items
        .iter()
        .filter(|i| !i.word.is_epsilon())
        .map(|i| i.time)
        .collect();
    assert_eq!(times, vec![4, 7]);
    // sil 1.0, two words at 0.5 + LM cost, final 1.5
    assert!((path.score - (1.0 + 0.5 + 1.0 + 0.5 + 2.0 + 1.5)).abs() < 1e-5);
}

#[test]
fn rebuilds_follow_the_reset_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());
    manager.init().unwrap();
    let first = manager.generation();

    let rebuilt: Vec<bool> = (0..4).map(|_| manager.reset(2).unwrap()).collect();
    assert_eq!(rebuilt, vec![false, true, false, true]);
    assert_eq!(manager.generation(), first + 2);

    let every: Vec<bool> = (0..3).map(|_| manager.reset(0).unwrap()).collect();
    assert_eq!(every, vec![true, true, true]);
}

#[test]
fn composed_states_decompose_into_components() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());
    manager.init().unwrap();
    let network = manager.network().unwrap();

    let start = network.start().unwrap();
    let arcs = network.arcs(start);
    assert_eq!(arcs.len(), 3);
    for arc in arcs.iter() {
        assert!(manager.lexicon_state(arc.next).is_some());
        assert_eq!(manager.grammar_state(arc.next), Some(wfst_decoder::types::StateId(0)));
    }
    assert!((network.final_weight(start) - 1.5).abs() < 1e-6);
}

#[test]
fn missing_network_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = NetworkManager::new(
        TextFstSource::new(dir.path().join("missing-G.txt"), dir.path().join("L.txt")),
        1.0,
    );
    let err = manager.init().unwrap_err();
    assert!(matches!(err, DecoderError::NetworkLoad { .. }));
    assert!(err.is_fatal());
    assert!(manager.network().is_err());
}

#[test]
fn malformed_lines_report_their_position() {
    let dir = tempfile::tempdir().unwrap();
    let grammar = write(dir.path(), "G.txt", GRAMMAR);
    let lexicon = write(dir.path(), "L.txt", "0 1 1 10\n0 x 2 0\n");
    let mut manager = NetworkManager::new(TextFstSource::new(grammar, lexicon), 1.0);
    match manager.init() {
        Err(DecoderError::Parse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

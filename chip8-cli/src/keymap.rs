//! Host keyboard to Chip-8 keypad mapping.
use chip8::{KeyCode, KeyEvent};
use serde::Deserialize;

/// Default layout, mapping the COSMAC VIP keypad onto the left
/// side of a QWERTY keyboard.
///
/// ```text
/// 1 2 3 C      1 2 3 4
/// 4 5 6 D  ->  q w e r
/// 7 8 9 E      a s d f
/// A 0 B F      z x c v
/// ```
#[rustfmt::skip]
const COSMAC_LAYOUT: [(char, u8); 16] = [
    ('1', 0x1), ('2', 0x2), ('3', 0x3), ('4', 0xC),
    ('q', 0x4), ('w', 0x5), ('e', 0x6), ('r', 0xD),
    ('a', 0x7), ('s', 0x8), ('d', 0x9), ('f', 0xE),
    ('z', 0xA), ('x', 0x0), ('c', 0xB), ('v', 0xF),
];

/// Entry of the key map configuration.
#[derive(Debug, Deserialize)]
pub struct KeyDef {
    pub chip8: KeyCode,
    #[serde(default)]
    pub keys: Vec<char>,
}

/// Command read from the host input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    Key(KeyEvent),
    Quit,
}

#[derive(Debug)]
pub struct KeyMap {
    keys: Box<[(char, KeyCode)]>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let keys = COSMAC_LAYOUT
            .iter()
            .filter_map(|(c, key_id)| KeyCode::try_from(*key_id).ok().map(|k| (*c, k)))
            .collect();
        Self { keys }
    }
}

impl KeyMap {
    pub fn from_defs(defs: &[KeyDef]) -> Self {
        let keys = defs
            .iter()
            // flatten every host key of a definition into its own mapping
            .flat_map(|def| {
                def.keys
                    .iter()
                    .map(move |c| (c.to_ascii_lowercase(), def.chip8))
            })
            .collect();
        Self { keys }
    }

    /// Given a host key, map it to a Chip-8 key.
    pub fn map_key(&self, key: char) -> Option<KeyCode> {
        let key = key.to_ascii_lowercase();
        self.keys
            .iter()
            .find(|(c, _)| *c == key)
            .map(|(_, keycode)| *keycode)
    }

    /// Parse a line of the input protocol.
    ///
    /// Tokens are whitespace separated. `+c` presses and `-c` releases the
    /// host key `c`, and `quit` stops the machine. Unmapped keys produce nothing.
    pub fn parse_line(&self, line: &str) -> Vec<HostInput> {
        let mut commands = vec![];

        for token in line.split_whitespace() {
            if token.eq_ignore_ascii_case("quit") {
                commands.push(HostInput::Quit);
                continue;
            }

            let mut chars = token.chars();
            let (pressed, key) = match (chars.next(), chars.next(), chars.next()) {
                (Some('+'), Some(key), None) => (true, key),
                (Some('-'), Some(key), None) => (false, key),
                _ => {
                    log::warn!("unrecognised input token: {token:?}");
                    continue;
                }
            };

            match self.map_key(key) {
                Some(key) => commands.push(HostInput::Key(KeyEvent { key, pressed })),
                None => log::trace!("no input mapping for {key:?}"),
            }
        }

        commands
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_layout() {
        let keymap = KeyMap::default();
        assert_eq!(keymap.map_key('1'), Some(KeyCode::Key1));
        assert_eq!(keymap.map_key('4'), Some(KeyCode::KeyC));
        assert_eq!(keymap.map_key('x'), Some(KeyCode::Key0));
        assert_eq!(keymap.map_key('V'), Some(KeyCode::KeyF));
        assert_eq!(keymap.map_key('p'), None);
    }

    #[test]
    fn test_parse_line() {
        let keymap = KeyMap::default();
        let commands = keymap.parse_line("+w  -w +p ?? quit");

        assert_eq!(
            commands,
            vec![
                HostInput::Key(KeyEvent::press(KeyCode::Key5)),
                HostInput::Key(KeyEvent::release(KeyCode::Key5)),
                HostInput::Quit,
            ]
        );
    }

    #[test]
    fn test_from_yaml() {
        let defs: Vec<KeyDef> = serde_yaml::from_str(
            r#"
- chip8: 10
  keys: [j, K]
- chip8: 0
  keys: [" "]
"#,
        )
        .unwrap();
        let keymap = KeyMap::from_defs(&defs);

        assert_eq!(keymap.map_key('j'), Some(KeyCode::KeyA));
        assert_eq!(keymap.map_key('k'), Some(KeyCode::KeyA));
        assert_eq!(keymap.map_key(' '), Some(KeyCode::Key0));
        assert_eq!(keymap.map_key('1'), None);
    }

    #[test]
    fn test_invalid_keycode_rejected() {
        let defs: Result<Vec<KeyDef>, _> = serde_yaml::from_str("- chip8: 16\n  keys: [a]\n");
        assert!(defs.is_err());
    }
}
